use std::error::Error;
use std::sync::Arc;

use http::header::CONNECTION;
use http::{HeaderValue, StatusCode};
use micro_channel::buffer::BufferSegment;
use micro_channel::channel::BinaryChannel;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{MessageDecoder, MessageEncoder};
use crate::handler::Handler;
use crate::protocol::{HttpError, HttpMessage, HttpRequest, HttpResponse, ParseError, Sequenced};

/// An HTTP connection bound to one [`BinaryChannel`]
///
/// `HttpConnection` owns the channel together with the receive segment, the decoder and the
/// encoder, and drives them through the full lifecycle of the connection:
/// - Reading and decoding requests
/// - Calling the handler
/// - Encoding responses back through the channel
/// - Keep-alive and closing
///
/// [`process`](Self::process) answers one request at a time.
/// [`process_pipelined`](Self::process_pipelined) keeps several handlers running while it
/// continues to decode, and still writes responses in request order.
pub struct HttpConnection<S> {
    pub(super) channel: BinaryChannel<S>,
    pub(super) segment: BufferSegment,
    pub(super) decoder: MessageDecoder,
    pub(super) encoder: MessageEncoder,
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: BinaryChannel<S>, decoder: MessageDecoder) -> Self {
        let segment = channel.pool().lease();
        Self { channel, segment, decoder, encoder: MessageEncoder::new() }
    }

    pub fn channel(&self) -> &BinaryChannel<S> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut BinaryChannel<S> {
        &mut self.channel
    }

    pub fn into_channel(self) -> BinaryChannel<S> {
        self.channel
    }

    /// Resets the channel, the decoder and the encoder so the connection can be reused.
    pub async fn reset(&mut self) {
        self.decoder.reset_connection();
        self.encoder.clear();
        self.segment.reset();
        self.channel.reset().await;
    }

    /// Processes requests one at a time until the connection ends.
    ///
    /// Each request is decoded, passed to the handler and answered before the next one is
    /// read. A handler error is answered with `500 Internal Server Error`. The loop ends when
    /// the peer closes its send direction between requests or sends a non keep-alive
    /// request; the channel is closed in both cases.
    ///
    /// # Arguments
    ///
    /// * `handler` - Called once per request
    ///
    /// # Errors
    ///
    /// - [`HttpError::RequestError`] when a request is malformed, after a best effort error
    ///   response was sent, or when the peer closed in the middle of a request
    /// - [`HttpError::ResponseError`] or [`HttpError::ChannelError`] when writing failed
    pub async fn process<H: Handler>(&mut self, handler: Arc<H>) -> Result<(), HttpError> {
        let sender = self.channel.sender();

        loop {
            let request = match self.decoder.read_message(&mut self.channel, &mut self.segment).await {
                Ok(Some(HttpMessage::Request(request))) => request,
                Ok(Some(HttpMessage::Response(response))) => {
                    let error = ParseError::invalid_start_line(format!("unexpected status line with status {}", response.status()));
                    return self.on_parse_error(error).await;
                }
                Ok(None) => {
                    info!(channel = %self.channel.id(), "can't read more request, break this connection down");
                    self.channel.close().await?;
                    return Ok(());
                }
                Err(e) => return self.on_parse_error(e).await,
            };

            let keep_alive = request.keep_alive();
            let response = answer(handler.as_ref(), request).await;
            self.encoder.send_message(&sender, finish_response(response, keep_alive).into()).await?;

            if !keep_alive {
                debug!(channel = %self.channel.id(), "connection is not keep-alive, closing");
                self.channel.close().await?;
                return Ok(());
            }
        }
    }

    /// Sends a best effort error response for client errors, then closes the channel.
    pub(super) async fn on_parse_error(&mut self, e: ParseError) -> Result<(), HttpError> {
        let Some(status) = e.status_code() else {
            error!(channel = %self.channel.id(), cause = %e, "can't receive next request");
            if let Err(close_error) = self.channel.close().await {
                debug!(channel = %self.channel.id(), cause = %close_error, "close after transport failure failed");
            }
            return Err(e.into());
        };

        warn!(channel = %self.channel.id(), cause = %e, status = status.as_u16(), "malformed request");
        let response = finish_response(HttpResponse::new(status), false);
        let sender = self.channel.sender();
        if let Err(send_error) = self.encoder.send_message(&sender, response.into()).await {
            warn!(channel = %self.channel.id(), cause = %send_error, "failed to send error response");
        }

        self.channel.report_failure(&e);
        if let Err(close_error) = self.channel.close().await {
            debug!(channel = %self.channel.id(), cause = %close_error, "close after malformed request failed");
        }
        Err(e.into())
    }
}

impl<S> std::fmt::Debug for HttpConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("channel", &self.channel).field("decoder", &self.decoder).finish_non_exhaustive()
    }
}

/// Calls the handler, turning a handler failure into a `500` response.
pub(super) async fn answer<H: Handler + ?Sized>(handler: &H, request: HttpRequest) -> HttpResponse {
    let sequence = request.sequence();
    let mut response = match handler.call(request).await {
        Ok(response) => response,
        Err(e) => {
            let e: Box<dyn Error + Send + Sync> = e.into();
            error!(cause = %e, "handle response error");
            HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    if let Some(sequence) = sequence.filter(|_| response.sequence().is_none()) {
        response.set_sequence(sequence);
    }
    response
}

pub(super) fn finish_response(mut response: HttpResponse, keep_alive: bool) -> HttpResponse {
    if !keep_alive {
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use bytes::BytesMut;
    use micro_channel::channel::{ChannelBuilder, ChannelConfig};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio_util::codec::Decoder;

    async fn hello(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
        if request.uri().path() == "/fail" {
            return Err("handler failed".into());
        }
        let mut response = request.create_response();
        response.set_body(format!("hello {}", request.uri().path()));
        Ok(response)
    }

    async fn connection() -> (HttpConnection<DuplexStream>, DuplexStream) {
        let (local, remote) = duplex(1024);
        let config = ChannelConfig::new().close_timeout(Duration::from_millis(100));
        let channel = ChannelBuilder::new().config(config).open(local, None).await.unwrap();
        (HttpConnection::new(channel, MessageDecoder::default()), remote)
    }

    async fn exchange(client: &mut DuplexStream, raw: &str) -> Vec<HttpResponse> {
        client.write_all(raw.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();

        let mut buffer = BytesMut::from(&received[..]);
        let mut decoder = MessageDecoder::default();
        let mut responses = Vec::new();
        while let Some(message) = decoder.decode(&mut buffer).unwrap() {
            responses.push(message.into_response().unwrap());
        }
        responses
    }

    #[tokio::test]
    async fn answers_keep_alive_requests() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n").await;
        server.await.unwrap().unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].body().bytes().as_ref(), b"hello /a");
        assert_eq!(responses[0].sequence(), Some(0));
        assert_eq!(responses[1].body().bytes().as_ref(), b"hello /b");
        assert_eq!(responses[1].headers().get(CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn half_closed_client_gets_answers_then_close() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n").await;
        server.await.unwrap().unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].body().bytes().as_ref(), b"hello /b");
        assert!(responses[1].headers().get(CONNECTION).is_none());
    }

    #[tokio::test]
    async fn handler_error_becomes_500() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "GET /fail HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        server.await.unwrap().unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(responses[0].content_length(), Some(0));
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_closes() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "FOO /bar\r\n\r\n").await;
        let result = server.await.unwrap();

        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::InvalidStartLine { .. } })));
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remote_close_between_requests_is_clean() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "").await;
        assert!(responses.is_empty());
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn truncated_request_is_fatal_without_response() {
        let (mut connection, mut client) = connection().await;
        let server = tokio::spawn(async move { connection.process(Arc::new(make_handler(hello))).await });

        let responses = exchange(&mut client, "POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await;
        let result = server.await.unwrap();

        assert!(responses.is_empty());
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::ChannelDisconnected })));
    }
}
