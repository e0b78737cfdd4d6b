//! Structured decoding of request bodies.
//!
//! A [`BodyDeserializer`] configured on the
//! [`MessageDecoder`](crate::codec::MessageDecoder) turns a completed request body into a
//! [`DecodedBody`] of parameters and uploaded files, keyed by the request's content type.
//!
//! - [`UrlEncodedDeserializer`]: `application/x-www-form-urlencoded`
//! - [`MultipartDeserializer`]: `multipart/form-data`
//! - [`CompositeDeserializer`]: tries a list of deserializers in order

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod multipart;
mod urlencoded;

pub use multipart::MultipartDeserializer;
pub use urlencoded::UrlEncodedDeserializer;

#[derive(Error, Debug)]
pub enum DeserializeError {
    #[error("unsupported content type: {content_type}")]
    Unsupported { content_type: String },

    #[error("malformed body: {reason}")]
    Malformed { reason: String },
}

impl DeserializeError {
    pub fn unsupported(content_type: &Mime) -> Self {
        Self::Unsupported { content_type: content_type.to_string() }
    }

    pub fn malformed<S: ToString>(reason: S) -> Self {
        Self::Malformed { reason: reason.to_string() }
    }
}

/// Decodes a request body of a given content type.
pub trait BodyDeserializer: Send + Sync {
    /// Returns [`DeserializeError::Unsupported`] when `content_type` is not handled.
    fn deserialize(&self, content_type: &Mime, body: &Bytes) -> Result<DecodedBody, DeserializeError>;
}

impl<T: BodyDeserializer + ?Sized> BodyDeserializer for Arc<T> {
    fn deserialize(&self, content_type: &Mime, body: &Bytes) -> Result<DecodedBody, DeserializeError> {
        (**self).deserialize(content_type, body)
    }
}

/// A file part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// The form field name.
    pub name: String,
    pub file_name: String,
    pub content_type: Option<Mime>,
    pub data: Bytes,
}

/// Form parameters and uploaded files decoded from a request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBody {
    pub params: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

impl DecodedBody {
    /// The first value of parameter `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Deserializes the parameters into `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, DeserializeError> {
        let encoded = serde_urlencoded::to_string(&self.params).map_err(DeserializeError::malformed)?;
        serde_urlencoded::from_str(&encoded).map_err(DeserializeError::malformed)
    }
}

/// Tries each deserializer in order and returns the first result that is not
/// [`DeserializeError::Unsupported`].
#[derive(Clone)]
pub struct CompositeDeserializer {
    deserializers: Vec<Arc<dyn BodyDeserializer>>,
}

impl CompositeDeserializer {
    pub fn new(deserializers: Vec<Arc<dyn BodyDeserializer>>) -> Self {
        Self { deserializers }
    }

    #[must_use]
    pub fn with(mut self, deserializer: impl BodyDeserializer + 'static) -> Self {
        self.deserializers.push(Arc::new(deserializer));
        self
    }
}

impl Default for CompositeDeserializer {
    fn default() -> Self {
        Self::new(vec![Arc::new(UrlEncodedDeserializer), Arc::new(MultipartDeserializer)])
    }
}

impl BodyDeserializer for CompositeDeserializer {
    fn deserialize(&self, content_type: &Mime, body: &Bytes) -> Result<DecodedBody, DeserializeError> {
        for deserializer in &self.deserializers {
            match deserializer.deserialize(content_type, body) {
                Err(DeserializeError::Unsupported { .. }) => {}
                result => return result,
            }
        }
        Err(DeserializeError::unsupported(content_type))
    }
}

impl fmt::Debug for CompositeDeserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDeserializer").field("deserializers", &self.deserializers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Login {
        user: String,
        remember: bool,
    }

    #[test]
    fn composite_dispatches_by_content_type() {
        let composite = CompositeDeserializer::default();

        let form: Mime = "application/x-www-form-urlencoded".parse().unwrap();
        let decoded = composite.deserialize(&form, &Bytes::from_static(b"user=zava&remember=true")).unwrap();
        assert_eq!(decoded.param("user"), Some("zava"));
        assert_eq!(decoded.params_as::<Login>().unwrap(), Login { user: "zava".into(), remember: true });

        let json: Mime = "application/json".parse().unwrap();
        assert!(matches!(composite.deserialize(&json, &Bytes::from_static(b"{}")), Err(DeserializeError::Unsupported { .. })));
    }
}
