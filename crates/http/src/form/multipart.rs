//! `multipart/form-data` decoding.
//!
//! ```text
//! --boundary\r\n
//! Content-Disposition: form-data; name="field"; filename="a.txt"\r\n
//! Content-Type: text/plain\r\n
//! \r\n
//! <data>\r\n
//! --boundary--
//! ```

use bytes::Bytes;
use mime::Mime;

use super::{BodyDeserializer, DecodedBody, DeserializeError, UploadedFile};

/// Decodes `multipart/form-data` bodies. Parts with a `filename` become [`UploadedFile`]s,
/// the others become parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartDeserializer;

impl BodyDeserializer for MultipartDeserializer {
    fn deserialize(&self, content_type: &Mime, body: &Bytes) -> Result<DecodedBody, DeserializeError> {
        if content_type.type_() != mime::MULTIPART || content_type.subtype() != mime::FORM_DATA {
            return Err(DeserializeError::unsupported(content_type));
        }
        let boundary = content_type.get_param(mime::BOUNDARY).ok_or_else(|| DeserializeError::malformed("missing multipart boundary"))?;

        let delimiter = format!("--{}", boundary.as_str());
        let mut decoded = DecodedBody::default();

        let start = find(body, delimiter.as_bytes(), 0).ok_or_else(|| DeserializeError::malformed("missing first boundary"))?;
        let mut cursor = start + delimiter.len();

        loop {
            if body[cursor..].starts_with(b"--") {
                return Ok(decoded);
            }
            cursor = skip_line_break(body, cursor)?;

            let head_end = find(body, b"\r\n\r\n", cursor).ok_or_else(|| DeserializeError::malformed("unterminated part headers"))?;
            let part = PartHead::parse(&body[cursor..head_end])?;
            let data_start = head_end + 4;

            let closing = format!("\r\n{delimiter}");
            let data_end = find(body, closing.as_bytes(), data_start).ok_or_else(|| DeserializeError::malformed("unterminated part"))?;
            let data = body.slice(data_start..data_end);

            match part.file_name {
                Some(file_name) => decoded.files.push(UploadedFile { name: part.name, file_name, content_type: part.content_type, data }),
                None => {
                    let value = String::from_utf8(data.to_vec()).map_err(DeserializeError::malformed)?;
                    decoded.params.push((part.name, value));
                }
            }
            cursor = data_end + closing.len();
        }
    }
}

struct PartHead {
    name: String,
    file_name: Option<String>,
    content_type: Option<Mime>,
}

impl PartHead {
    fn parse(head: &[u8]) -> Result<Self, DeserializeError> {
        let head = std::str::from_utf8(head).map_err(DeserializeError::malformed)?;
        let mut name = None;
        let mut file_name = None;
        let mut content_type = None;

        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for attribute in value.split(';').skip(1) {
                    let Some((attr_key, attr_value)) = attribute.split_once('=') else {
                        continue;
                    };
                    let attr_value = attr_value.trim().trim_matches('"').to_string();
                    match attr_key.trim() {
                        "name" => name = Some(attr_value),
                        "filename" => file_name = Some(attr_value),
                        _ => {}
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                content_type = value.trim().parse::<Mime>().ok();
            }
        }

        let name = name.ok_or_else(|| DeserializeError::malformed("part without a name"))?;
        Ok(Self { name, file_name, content_type })
    }
}

fn skip_line_break(body: &[u8], cursor: usize) -> Result<usize, DeserializeError> {
    if body[cursor..].starts_with(b"\r\n") {
        Ok(cursor + 2)
    } else {
        Err(DeserializeError::malformed("boundary not followed by a line break"))
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|window| window == needle).map(|position| position + from)
}
