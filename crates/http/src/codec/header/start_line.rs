//! Request line and status line parsing.
//!
//! The first line of a message is split into three whitespace separated parts. A line whose
//! first part is a case-insensitive `HTTP/` token is a status line (version, code, reason);
//! a line whose third part is one is a request line (method, target, version). Anything else
//! is rejected.

use http::{Method, StatusCode, Version};

use crate::protocol::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartLine {
    Request { method: Method, target: String, version: Version },
    Status { version: Version, status: StatusCode, reason: String },
}

impl StartLine {
    pub(crate) fn is_request(&self) -> bool {
        matches!(self, StartLine::Request { .. })
    }

    pub(crate) fn parse(line: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_utf8| ParseError::invalid_start_line(String::from_utf8_lossy(line)))?;
        let (first, second, third) = split_parts(line).ok_or_else(|| ParseError::invalid_start_line(line))?;

        if is_version_token(first) {
            let version = parse_version(first)?;
            let status = second
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| ParseError::InvalidStatusCode { code: second.to_string() })?;
            return Ok(StartLine::Status { version, status, reason: third.to_string() });
        }

        if is_version_token(third) {
            let method = Method::from_bytes(first.as_bytes()).map_err(|_invalid| ParseError::InvalidMethod { method: first.to_string() })?;
            let version = parse_version(third)?;
            return Ok(StartLine::Request { method, target: second.to_string(), version });
        }

        Err(ParseError::invalid_start_line(line))
    }
}

/// Splits `first SP second SP rest`. The third part may be empty; the first two may not.
fn split_parts(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim();
    let (first, rest) = line.split_once([' ', '\t'])?;
    let rest = rest.trim_start();
    let (second, third) = rest.split_once([' ', '\t']).unwrap_or((rest, ""));
    if second.is_empty() {
        return None;
    }
    Some((first, second, third.trim()))
}

fn is_version_token(token: &str) -> bool {
    token.len() >= 5 && token.as_bytes()[..5].eq_ignore_ascii_case(b"HTTP/")
}

fn parse_version(token: &str) -> Result<Version, ParseError> {
    match &token[5..] {
        "1.1" => Ok(Version::HTTP_11),
        "1.0" => Ok(Version::HTTP_10),
        // HTTP/2 and later are not spoken on this wire format
        _ => Err(ParseError::InvalidVersion { version: token.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line() {
        let line = StartLine::parse(b"GET /foo?x=1 HTTP/1.1").unwrap();
        assert_eq!(line, StartLine::Request { method: Method::GET, target: "/foo?x=1".into(), version: Version::HTTP_11 });

        let line = StartLine::parse(b"post /upload http/1.0").unwrap();
        assert!(matches!(line, StartLine::Request { version: Version::HTTP_10, .. }));
    }

    #[test]
    fn status_line() {
        let line = StartLine::parse(b"HTTP/1.1 404 Not Found").unwrap();
        assert_eq!(line, StartLine::Status { version: Version::HTTP_11, status: StatusCode::NOT_FOUND, reason: "Not Found".into() });

        let line = StartLine::parse(b"HTTP/1.1 204").unwrap();
        assert_eq!(line, StartLine::Status { version: Version::HTTP_11, status: StatusCode::NO_CONTENT, reason: String::new() });
    }

    #[test]
    fn malformed_lines() {
        assert!(matches!(StartLine::parse(b"FOO /bar"), Err(ParseError::InvalidStartLine { .. })));
        assert!(matches!(StartLine::parse(b"GET"), Err(ParseError::InvalidStartLine { .. })));
        assert!(matches!(StartLine::parse(b"GET / b HTTP/1.1"), Err(ParseError::InvalidStartLine { .. })));
        assert!(matches!(StartLine::parse(b"HTTP/1.1 abc OK"), Err(ParseError::InvalidStatusCode { .. })));
        assert!(matches!(StartLine::parse(b"GET / HTTP/2.0"), Err(ParseError::InvalidVersion { .. })));
        assert!(matches!(StartLine::parse(b"G(T / HTTP/1.1"), Err(ParseError::InvalidMethod { .. })));
        assert!(matches!(StartLine::parse(&[0xff, b' ', b'/', b' ', b'x']), Err(ParseError::InvalidStartLine { .. })));
    }
}
