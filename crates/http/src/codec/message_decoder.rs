//! HTTP message decoder
//!
//! Decodes requests (server side) and responses (client side) from a byte stream that may be
//! split at any boundary. The decoder owns all progress between reads, so feeding the same
//! bytes in any partition yields the same messages.
//!
//! # State Machine
//!
//! ```text
//! AwaitingStatusLine --start line--> AwaitingHeaders --blank line--> AwaitingBody --> Complete
//!                                                     \--no content-length-------------^
//! ```
//!
//! After `Complete` the message is handed out and the decoder returns to `AwaitingStatusLine`.
//!
//! # Example
//!
//! ```
//! use micro_channel_http::codec::MessageDecoder;
//! use micro_channel_http::protocol::HttpMessage;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = MessageDecoder::default();
//! let mut buffer = BytesMut::from("GET /foo?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
//! let Some(HttpMessage::Request(request)) = decoder.decode(&mut buffer).unwrap() else {
//!     panic!("expected a request");
//! };
//! assert_eq!(request.uri(), "http://example.com/foo?x=1");
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::{HeaderValue, Request, Response, Uri};
use micro_channel::buffer::BufferSegment;
use micro_channel::channel::BinaryChannel;
use mime::Mime;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::header::{HeaderDecoder, MessageHead, StartLine};
use crate::ensure;
use crate::form::{BodyDeserializer, DeserializeError};
use crate::protocol::{HttpMessage, HttpRequest, HttpResponse, MessageBody, ParseError};

/// Default maximum size of a message head, start line included
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Default maximum number of header lines
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// Default maximum declared `Content-Length`
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub max_header_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
    /// Whether the channel is TLS wrapped, which makes request URIs `https`.
    pub secure: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_headers: DEFAULT_MAX_HEADERS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            secure: false,
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    #[must_use]
    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitingStatusLine,
    AwaitingHeaders,
    AwaitingBody,
    Complete,
}

pub struct MessageDecoder {
    config: DecoderConfig,
    deserializer: Option<Arc<dyn BodyDeserializer>>,
    state: DecodeState,
    header_decoder: HeaderDecoder,
    head: Option<MessageHead>,
    body: BytesMut,
    remaining: usize,
    next_sequence: u64,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl MessageDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            deserializer: None,
            state: DecodeState::AwaitingStatusLine,
            header_decoder: HeaderDecoder::new(config.max_header_bytes, config.max_headers),
            head: None,
            body: BytesMut::new(),
            remaining: 0,
            next_sequence: 0,
        }
    }

    /// Decodes request bodies into a [`DecodedBody`](crate::form::DecodedBody) when the
    /// content type is one `deserializer` handles.
    #[must_use]
    pub fn with_deserializer(mut self, deserializer: Arc<dyn BodyDeserializer>) -> Self {
        self.deserializer = Some(deserializer);
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// The sequence number the next decoded request will be stamped with.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// True when no byte of a message has been consumed since the last complete message.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitingStatusLine && self.header_decoder.is_empty()
    }

    /// Drops the message in progress. The sequence counter is kept.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitingStatusLine;
        self.header_decoder.reset();
        self.head = None;
        self.body = BytesMut::new();
        self.remaining = 0;
    }

    /// Prepares the decoder for a new connection.
    pub fn reset_connection(&mut self) {
        self.reset();
        self.next_sequence = 0;
    }

    /// Consumes bytes from `src` until a message completes or the input is exhausted.
    ///
    /// Returns the number of bytes consumed. Bytes following a completed message are not
    /// consumed, they belong to the next message.
    ///
    /// # Arguments
    ///
    /// * `src` - Received bytes, starting where the previous call stopped consuming
    ///
    /// # Returns
    ///
    /// `(consumed, Some(message))` once a message completes, `(consumed, None)` when more
    /// input is needed. Feeding the same bytes in any split yields the same messages.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The start line or a header line is malformed
    /// - The head exceeds [`DecoderConfig::max_header_bytes`] or [`DecoderConfig::max_headers`]
    /// - `Content-Length` is not a plain decimal number, or exceeds [`DecoderConfig::max_body_bytes`]
    /// - `Transfer-Encoding` is present
    /// - The body deserializer rejects the body
    pub fn decode_bytes(&mut self, src: &[u8]) -> Result<(usize, Option<HttpMessage>), ParseError> {
        let mut consumed = 0;
        loop {
            match self.state {
                DecodeState::AwaitingStatusLine | DecodeState::AwaitingHeaders => {
                    let (n, head) = self.header_decoder.decode(&src[consumed..])?;
                    consumed += n;
                    match head {
                        Some(head) => self.begin_body(head)?,
                        None => {
                            if self.header_decoder.has_start_line() {
                                self.state = DecodeState::AwaitingHeaders;
                            }
                            return Ok((consumed, None));
                        }
                    }
                }
                DecodeState::AwaitingBody => {
                    let available = &src[consumed..];
                    let take = self.remaining.min(available.len());
                    self.body.extend_from_slice(&available[..take]);
                    self.remaining -= take;
                    consumed += take;

                    if self.remaining > 0 {
                        return Ok((consumed, None));
                    }
                    self.state = DecodeState::Complete;
                }
                DecodeState::Complete => return Ok((consumed, Some(self.complete()?))),
            }
        }
    }

    /// Decodes from the unread window of `segment`, consuming what was used.
    pub fn decode_segment(&mut self, segment: &mut BufferSegment) -> Result<Option<HttpMessage>, ParseError> {
        let (consumed, message) = self.decode_bytes(segment.unread())?;
        segment.consume(consumed);
        Ok(message)
    }

    /// Reads from `channel` into `segment` until one message is complete.
    ///
    /// Returns `Ok(None)` when the remote side closed the channel between messages. A close
    /// in the middle of a message is [`ParseError::ChannelDisconnected`].
    ///
    /// The future is cancel safe: bytes already received stay in `segment` and the decoder,
    /// and a later call continues where this one stopped.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Decoding fails, see [`decode_bytes`](Self::decode_bytes)
    /// - The peer closes in the middle of a message
    /// - The channel fails to receive
    pub async fn read_message<S>(&mut self, channel: &mut BinaryChannel<S>, segment: &mut BufferSegment) -> Result<Option<HttpMessage>, ParseError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            if !segment.is_empty() {
                if let Some(message) = self.decode_segment(segment)? {
                    return Ok(Some(message));
                }
            }

            if channel.receive(segment).await? == 0 {
                if self.is_idle() {
                    return Ok(None);
                }
                debug!(channel = %channel.id(), state = ?self.state, "channel closed mid-message");
                return Err(ParseError::ChannelDisconnected);
            }
        }
    }

    fn begin_body(&mut self, head: MessageHead) -> Result<(), ParseError> {
        ensure!(!head.headers.contains_key(TRANSFER_ENCODING), ParseError::UnsupportedTransferEncoding);

        let content_length = match head.headers.get(CONTENT_LENGTH) {
            Some(value) => parse_content_length(value)?,
            None => 0,
        };
        ensure!(
            content_length <= self.config.max_body_bytes as u64,
            ParseError::TooLargeBody { length: content_length, max_size: self.config.max_body_bytes }
        );

        // bounded by max_body_bytes above
        let content_length = usize::try_from(content_length).map_err(ParseError::invalid_content_length)?;
        self.head = Some(head);
        if content_length == 0 {
            self.state = DecodeState::Complete;
        } else {
            trace!(content_length, "awaiting body");
            self.body = BytesMut::with_capacity(content_length);
            self.remaining = content_length;
            self.state = DecodeState::AwaitingBody;
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<HttpMessage, ParseError> {
        let head = self.head.take().ok_or_else(|| ParseError::invalid_body("completed without a message head"))?;
        let body = MessageBody::from(self.body.split().freeze());
        self.state = DecodeState::AwaitingStatusLine;

        let MessageHead { start_line, headers, cookies } = head;
        let message = match start_line {
            StartLine::Request { method, target, version } => {
                let uri = absolute_uri(&target, headers.get(HOST), self.config.secure)?;

                let mut inner = Request::new(body);
                *inner.method_mut() = method;
                *inner.uri_mut() = uri;
                *inner.version_mut() = version;
                *inner.headers_mut() = headers;

                let mut request = HttpRequest::from(inner);
                request.set_cookies(cookies);
                request.set_sequence(self.next_sequence);
                self.next_sequence += 1;

                self.deserialize(&mut request)?;
                HttpMessage::Request(request)
            }
            StartLine::Status { version, status, reason } => {
                let mut inner = Response::new(body);
                *inner.status_mut() = status;
                *inner.version_mut() = version;
                *inner.headers_mut() = headers;

                let mut response = HttpResponse::from(inner);
                if !reason.is_empty() {
                    response.set_reason(reason);
                }
                for cookie in cookies {
                    response.add_cookie(cookie);
                }
                HttpMessage::Response(response)
            }
        };

        trace!(request = message.is_request(), body_size = message.body().len(), "decoded message");
        Ok(message)
    }

    fn deserialize(&self, request: &mut HttpRequest) -> Result<(), ParseError> {
        let Some(deserializer) = &self.deserializer else {
            return Ok(());
        };
        if request.body().is_empty() {
            return Ok(());
        }
        let Some(value) = request.headers().get(CONTENT_TYPE) else {
            return Ok(());
        };

        let content_type = value
            .to_str()
            .ok()
            .and_then(|value| value.parse::<Mime>().ok())
            .ok_or_else(|| ParseError::unsupported_content_type(String::from_utf8_lossy(value.as_bytes())))?;
        if content_type.essence_str() == mime::TEXT_PLAIN.essence_str() {
            return Ok(());
        }

        match deserializer.deserialize(&content_type, request.body().bytes()) {
            Ok(decoded) => {
                request.set_decoded_body(decoded);
                Ok(())
            }
            Err(DeserializeError::Unsupported { content_type }) => Err(ParseError::UnsupportedContentType { content_type }),
            Err(DeserializeError::Malformed { reason }) => Err(ParseError::InvalidBody { reason }),
        }
    }
}

impl fmt::Debug for MessageDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDecoder")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .field("next_sequence", &self.next_sequence)
            .field("deserializer", &self.deserializer.is_some())
            .finish_non_exhaustive()
    }
}

impl Decoder for MessageDecoder {
    type Item = HttpMessage;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (consumed, message) = self.decode_bytes(src)?;
        src.advance(consumed);
        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if self.is_idle() && src.is_empty() => Ok(None),
            None => Err(ParseError::ChannelDisconnected),
        }
    }
}

fn parse_content_length(value: &HeaderValue) -> Result<u64, ParseError> {
    let cl_str = value.to_str().map_err(|_opaque| ParseError::invalid_content_length("value can't to_str"))?;
    let digits = cl_str.trim();
    // `u64::from_str` alone would take a leading `+`
    ensure!(!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()), ParseError::invalid_content_length(format!("value {cl_str} is not digits")));
    digits.parse::<u64>().map_err(|_parse| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))
}

/// Builds `{scheme}://{host}{target}` for origin-form targets when a `Host` header is present.
fn absolute_uri(target: &str, host: Option<&HeaderValue>, secure: bool) -> Result<Uri, ParseError> {
    let host = host.and_then(|value| value.to_str().ok()).map(str::trim).filter(|host| !host.is_empty());

    match host {
        Some(host) if target.starts_with('/') => {
            let scheme = if secure { "https" } else { "http" };
            format!("{scheme}://{host}{target}").parse::<Uri>().map_err(ParseError::invalid_uri)
        }
        _ => target.parse::<Uri>().map_err(ParseError::invalid_uri),
    }
}
