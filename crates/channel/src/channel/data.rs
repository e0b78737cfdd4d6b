use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Per connection key/value scratch space.
///
/// Values live as long as the connection, or until the channel is reset for reuse.
#[derive(Default)]
pub struct ChannelData {
    items: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ChannelData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the previous value if it had the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.items.insert(key.into(), Box::new(value)).and_then(|old| old.downcast::<T>().ok()).map(|old| *old)
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.items.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key).and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.items.remove(key).and_then(|value| value.downcast::<T>().ok()).map(|value| *value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl fmt::Debug for ChannelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut data = ChannelData::new();
        assert!(data.insert("user", String::from("zava")).is_none());
        data.insert("visits", 1u32);

        assert_eq!(data.get::<String>("user").map(String::as_str), Some("zava"));
        assert_eq!(data.get::<u64>("visits"), None);

        *data.get_mut::<u32>("visits").unwrap() += 1;
        assert_eq!(data.get::<u32>("visits"), Some(&2));

        assert_eq!(data.remove::<u32>("visits"), Some(2));
        assert!(!data.contains_key("visits"));
    }

    #[test]
    fn replace_and_clear() {
        let mut data = ChannelData::new();
        data.insert("counter", 0usize);

        assert_eq!(data.insert("counter", 1usize), Some(0));
        assert_eq!(data.insert("counter", "one"), None);
        assert_eq!(data.get::<&str>("counter"), Some(&"one"));
        assert_eq!(data.len(), 1);

        data.clear();
        assert!(data.is_empty());
    }
}
