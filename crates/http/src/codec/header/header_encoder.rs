//! Serialization of the head of an HTTP message
//!
//! Writes the request line or status line followed by every header and the blank line
//! terminator. Header normalisation (`Content-Length`, cookies, `Host`) happens before,
//! in [`MessageEncoder::prepare`](crate::codec::MessageEncoder::prepare).

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{HttpMessage, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Encoder for message heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HeaderEncoder;

impl Encoder<&HttpMessage> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: &HttpMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        let version = version_token(item.version())?;

        match item {
            HttpMessage::Request(request) => {
                let target = request.uri().path_and_query().map_or("/", |path_and_query| path_and_query.as_str());
                write!(FastWrite(dst), "{} {} {}\r\n", request.method(), target, version)?;
            }
            HttpMessage::Response(response) => {
                write!(FastWrite(dst), "{} {} {}\r\n", version, response.status().as_str(), response.reason())?;
            }
        }

        write_headers(item.headers(), dst);
        Ok(())
    }
}

fn version_token(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(SendError::UnsupportedVersion { version: format!("{v:?}") })
        }
    }
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HttpRequest, HttpResponse};
    use http::{StatusCode, Uri};

    #[test]
    fn request_head() {
        let mut request = HttpRequest::get(Uri::from_static("http://example.com/foo?x=1"));
        request.headers_mut().insert(http::header::HOST, "example.com".parse().unwrap());

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(&HttpMessage::from(request), &mut dst).unwrap();
        assert_eq!(&dst[..], b"GET /foo?x=1 HTTP/1.1\r\nhost: example.com\r\n\r\n");
    }

    #[test]
    fn response_head() {
        let mut response = HttpResponse::new(StatusCode::IM_A_TEAPOT);
        response.headers_mut().insert(http::header::CONTENT_LENGTH, 0.into());

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(&HttpMessage::from(response), &mut dst).unwrap();
        assert_eq!(&dst[..], b"HTTP/1.1 418 I'm a teapot\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn rejects_http2() {
        let mut response = HttpResponse::ok();
        *response.as_mut().version_mut() = Version::HTTP_2;

        let result = HeaderEncoder.encode(&HttpMessage::from(response), &mut BytesMut::new());
        assert!(matches!(result, Err(SendError::UnsupportedVersion { .. })));
    }
}
