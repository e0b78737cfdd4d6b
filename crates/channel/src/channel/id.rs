use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque channel identity, unique among the channels created by one [`ChannelIdGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Hands out strictly increasing [`ChannelId`]s, usually one generator per server.
#[derive(Debug, Default)]
pub struct ChannelIdGenerator {
    next: AtomicU64,
}

impl ChannelIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ChannelId {
        ChannelId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let generator = ChannelIdGenerator::new();
        let first = generator.next_id();
        let second = generator.next_id();

        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(first.to_string(), "ch-1");
    }
}
