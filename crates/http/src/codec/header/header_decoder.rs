//! Incremental parser for the head of an HTTP message
//!
//! The parser scans for line terminators (CRLF, or a bare LF) across any number of reads.
//! Bytes of an unterminated line are kept in a partial line buffer until the rest arrives,
//! so the result never depends on where the input was split.
//!
//! # Limits
//!
//! - Maximum number of headers: 64 by default
//! - Maximum header section size: 8KB by default, start line included
//!
//! # Header rules
//!
//! - Each header line is split on the first colon; name and value are trimmed
//! - On duplicate names the first occurrence wins
//! - `Cookie` on requests and every `Set-Cookie` on responses are also parsed into cookies

use bytes::BytesMut;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use super::start_line::StartLine;
use crate::ensure;
use crate::protocol::{Cookie, ParseError};

/// The parsed head of a message, before its body is read.
#[derive(Debug)]
pub(crate) struct MessageHead {
    pub(crate) start_line: StartLine,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: Vec<Cookie>,
}

#[derive(Debug)]
pub(crate) struct HeaderDecoder {
    max_header_bytes: usize,
    max_headers: usize,
    /// Bytes of a line whose terminator has not arrived yet
    partial_line: BytesMut,
    header_bytes: usize,
    head: Option<MessageHead>,
}

impl HeaderDecoder {
    pub(crate) fn new(max_header_bytes: usize, max_headers: usize) -> Self {
        Self { max_header_bytes, max_headers, partial_line: BytesMut::new(), header_bytes: 0, head: None }
    }

    /// True once the start line has been parsed.
    pub(crate) fn has_start_line(&self) -> bool {
        self.head.is_some()
    }

    /// True when no byte of a message head has been seen since the last reset.
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none() && self.partial_line.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.partial_line.clear();
        self.header_bytes = 0;
        self.head = None;
    }

    /// Consumes bytes from `src` until the head is complete or the input is exhausted.
    ///
    /// Returns the number of bytes consumed and, once the blank line has been seen, the head.
    /// Bytes after the blank line are left untouched.
    pub(crate) fn decode(&mut self, src: &[u8]) -> Result<(usize, Option<MessageHead>), ParseError> {
        let mut consumed = 0;

        while let Some(position) = src[consumed..].iter().position(|b| *b == b'\n') {
            let line_end = consumed + position;
            let line_len = self.partial_line.len() + position + 1;
            self.header_bytes += line_len;
            ensure!(self.header_bytes <= self.max_header_bytes, ParseError::too_large_header(self.header_bytes, self.max_header_bytes));

            let completed = if self.partial_line.is_empty() {
                self.on_line(trim_cr(&src[consumed..line_end]))?
            } else {
                self.partial_line.extend_from_slice(&src[consumed..line_end]);
                let line = self.partial_line.split();
                self.on_line(trim_cr(&line))?
            };
            consumed = line_end + 1;

            if let Some(head) = completed {
                trace!(header_bytes = self.header_bytes, headers = head.headers.len(), "parsed message head");
                self.reset();
                return Ok((consumed, Some(head)));
            }
        }

        let rest = &src[consumed..];
        let pending = self.header_bytes + self.partial_line.len() + rest.len();
        ensure!(pending <= self.max_header_bytes, ParseError::too_large_header(pending, self.max_header_bytes));
        self.partial_line.extend_from_slice(rest);
        Ok((src.len(), None))
    }

    fn on_line(&mut self, line: &[u8]) -> Result<Option<MessageHead>, ParseError> {
        let Some(head) = self.head.as_mut() else {
            // empty lines before the start line are ignored
            if !line.is_empty() {
                let start_line = StartLine::parse(line)?;
                self.head = Some(MessageHead { start_line, headers: HeaderMap::new(), cookies: Vec::new() });
            }
            return Ok(None);
        };

        if line.is_empty() {
            return Ok(self.head.take());
        }

        ensure!(!matches!(line[0], b' ' | b'\t'), ParseError::invalid_header("obsolete line folding is not supported"));
        ensure!(head.headers.len() < self.max_headers, ParseError::too_many_headers(self.max_headers));

        let colon = line.iter().position(|b| *b == b':').ok_or_else(|| ParseError::invalid_header(String::from_utf8_lossy(line)))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii()).map_err(ParseError::invalid_header)?;

        if let Ok(text) = value.to_str() {
            if name == COOKIE && head.start_line.is_request() {
                head.cookies.extend(Cookie::parse_cookie_header(text));
            } else if name == SET_COOKIE && !head.start_line.is_request() {
                head.cookies.extend(Cookie::parse_set_cookie(text));
            }
        }

        if !head.headers.contains_key(&name) {
            head.headers.insert(name, value);
        }
        Ok(None)
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
