use bytes::Bytes;
use mime::Mime;

use super::{BodyDeserializer, DecodedBody, DeserializeError};

/// Decodes `application/x-www-form-urlencoded` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodedDeserializer;

impl BodyDeserializer for UrlEncodedDeserializer {
    fn deserialize(&self, content_type: &Mime, body: &Bytes) -> Result<DecodedBody, DeserializeError> {
        if content_type.essence_str() != mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            return Err(DeserializeError::unsupported(content_type));
        }

        let params = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body).map_err(DeserializeError::malformed)?;
        Ok(DecodedBody { params, files: Vec::new() })
    }
}
