//! Pipelining sequence numbers carried in the `X-Pipeline-Sequence` header.

use http::{HeaderMap, HeaderName, HeaderValue};

/// Header stamped on every decoded request, and echoed on its response
pub const PIPELINE_SEQUENCE: HeaderName = HeaderName::from_static("x-pipeline-sequence");

/// A message that may carry a pipelining sequence number.
pub trait Sequenced {
    fn sequence(&self) -> Option<u64>;
}

pub(crate) fn read_sequence(headers: &HeaderMap) -> Option<u64> {
    headers.get(&PIPELINE_SEQUENCE)?.to_str().ok()?.trim().parse().ok()
}

pub(crate) fn write_sequence(headers: &mut HeaderMap, sequence: u64) {
    headers.insert(PIPELINE_SEQUENCE, HeaderValue::from(sequence));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_sequence(&headers), None);

        write_sequence(&mut headers, 42);
        assert_eq!(headers.get("X-Pipeline-Sequence").unwrap(), "42");
        assert_eq!(read_sequence(&headers), Some(42));

        headers.insert(PIPELINE_SEQUENCE, HeaderValue::from_static("nope"));
        assert_eq!(read_sequence(&headers), None);
    }
}
