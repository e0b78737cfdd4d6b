//! HTTP message encoder
//!
//! A message is encoded in two steps. [`MessageEncoder::prepare`] normalises the headers and
//! serialises the head once. The head and body are then copied into send segments by
//! [`MessageEncoder::fill_buffer`], and every transmitted byte is acknowledged through
//! [`MessageEncoder::on_send_completed`], so a partial send resumes from the first unsent byte.
//!
//! ```text
//! prepare ──> fill_buffer ──> send ──> on_send_completed ──(not done)──> fill_buffer ...
//!                                                        └─(done)──────> clear
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, COOKIE, HOST, SET_COOKIE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue};
use micro_channel::buffer::BufferSegment;
use micro_channel::channel::ChannelSender;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Encoder;
use tracing::{trace, warn};

use crate::codec::header::HeaderEncoder;
use crate::ensure;
use crate::protocol::{Cookie, HttpMessage, SendError};

#[derive(Debug, Default)]
pub struct MessageEncoder {
    header_encoder: HeaderEncoder,
    head: Bytes,
    body: Bytes,
    /// Bytes copied into send segments so far
    filled: usize,
    /// Bytes acknowledged as transmitted
    sent: usize,
    prepared: bool,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Total size of the prepared message, head and body.
    pub fn encoded_len(&self) -> usize {
        self.head.len() + self.body.len()
    }

    /// Bytes filled but not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.filled - self.sent
    }

    /// Normalises `message` and serialises its head.
    ///
    /// `Content-Length` is always set to the body length, any `Transfer-Encoding` is removed,
    /// and cookie headers are rebuilt from the message's cookies.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A message is already prepared and not yet fully sent
    /// - The HTTP version is neither HTTP/1.0 nor HTTP/1.1
    pub fn prepare(&mut self, message: HttpMessage) -> Result<(), SendError> {
        ensure!(!self.prepared, SendError::AlreadyPrepared);

        let mut message = message;
        normalize_headers(&mut message);

        let mut head = BytesMut::new();
        self.header_encoder.encode(&message, &mut head)?;

        let body = match message {
            HttpMessage::Request(request) => request.into_inner().into_body(),
            HttpMessage::Response(response) => response.into_inner().into_body(),
        };

        self.head = head.freeze();
        self.body = body.into_bytes();
        self.filled = 0;
        self.sent = 0;
        self.prepared = true;
        trace!(head_size = self.head.len(), body_size = self.body.len(), "prepared message");
        Ok(())
    }

    /// Copies the next unfilled bytes, head first then body, into the spare room of `segment`.
    ///
    /// Returns the number of bytes copied, `0` once everything has been filled.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotPrepared`] if no message is prepared.
    pub fn fill_buffer(&mut self, segment: &mut BufferSegment) -> Result<usize, SendError> {
        ensure!(self.prepared, SendError::NotPrepared);

        let mut copied = 0;
        if self.filled < self.head.len() {
            let n = segment.write(&self.head[self.filled..]);
            self.filled += n;
            copied += n;
        }

        let head_len = self.head.len();
        if self.filled >= head_len && self.filled < self.encoded_len() {
            let n = segment.write(&self.body[self.filled - head_len..]);
            self.filled += n;
            copied += n;
        }
        Ok(copied)
    }

    /// Acknowledges `bytes` as transmitted and returns true once the whole message has been sent.
    ///
    /// After a partial send, the next [`fill_buffer`](Self::fill_buffer) continues with the
    /// first byte not yet filled.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Overrun`] if more bytes are acknowledged than were filled.
    pub fn on_send_completed(&mut self, bytes: usize) -> Result<bool, SendError> {
        ensure!(self.prepared, SendError::NotPrepared);
        ensure!(bytes <= self.pending(), SendError::Overrun { reported: bytes, pending: self.pending() });

        self.sent += bytes;
        Ok(self.sent == self.encoded_len())
    }

    /// Drops the current message.
    pub fn clear(&mut self) {
        self.head = Bytes::new();
        self.body = Bytes::new();
        self.filled = 0;
        self.sent = 0;
        self.prepared = false;
    }

    /// Sends `message` through `sender` using a segment leased from its pool.
    ///
    /// # Arguments
    ///
    /// * `sender` - Send side of the channel the message goes out on
    /// * `message` - The request or response to send
    ///
    /// # Errors
    ///
    /// Returns error if preparing fails or the channel fails to send. The encoder is cleared
    /// in both cases and can take the next message.
    pub async fn send_message<S>(&mut self, sender: &ChannelSender<S>, message: HttpMessage) -> Result<(), SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.prepare(message)?;
        let mut segment = sender.pool().lease();

        let result = self.transmit(sender, &mut segment).await;
        if let Err(e) = &result {
            warn!(channel = %sender.id(), cause = %e, "failed to send message");
        }
        self.clear();
        result
    }

    async fn transmit<S>(&mut self, sender: &ChannelSender<S>, segment: &mut BufferSegment) -> Result<(), SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            self.fill_buffer(segment)?;
            let count = segment.count();
            sender.send(segment.unread()).await?;
            segment.consume(count);
            if self.on_send_completed(count)? {
                return Ok(());
            }
        }
    }
}

impl Encoder<HttpMessage> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: HttpMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.prepare(item)?;
        dst.reserve(self.encoded_len());
        dst.put_slice(&self.head);
        dst.put_slice(&self.body);
        self.clear();
        Ok(())
    }
}

fn normalize_headers(message: &mut HttpMessage) {
    let body_len = message.body().len();
    let cookie_headers = match &*message {
        HttpMessage::Request(request) if !request.cookies().is_empty() => {
            HeaderValue::from_str(&Cookie::to_cookie_header(request.cookies())).ok().into_iter().collect()
        }
        HttpMessage::Response(response) => {
            response.cookies().iter().filter_map(|cookie| HeaderValue::from_str(&cookie.to_set_cookie()).ok()).collect()
        }
        HttpMessage::Request(_) => Vec::new(),
    };
    let absolute_host = match &*message {
        HttpMessage::Request(request) => request.uri().authority().and_then(|authority| HeaderValue::from_str(authority.as_str()).ok()),
        HttpMessage::Response(_) => None,
    };
    let is_request = message.is_request();

    let headers = message.headers_mut();
    if let Some(host) = absolute_host {
        headers.entry(HOST).or_insert(host);
    }
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    if !cookie_headers.is_empty() {
        replace_cookie_headers(headers, is_request, cookie_headers);
    }
}

fn replace_cookie_headers(headers: &mut HeaderMap, is_request: bool, values: Vec<HeaderValue>) {
    let name = if is_request { COOKIE } else { SET_COOKIE };
    headers.remove(&name);
    for value in values {
        headers.append(name.clone(), value);
    }
}
