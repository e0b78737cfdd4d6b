//! Pipelined request processing.
//!
//! Up to `depth` handler futures run concurrently in a [`FuturesUnordered`] while the decoder
//! keeps reading. Finished responses wait in a [`PipelineQueue`] and are written strictly in
//! sequence order. Reading pauses while `depth` handlers are in flight.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tracing::{debug, info, trace};

use super::HttpConnection;
use super::http_connection::{answer, finish_response};
use crate::handler::Handler;
use crate::pipeline::PipelineQueue;
use crate::protocol::{HttpError, HttpMessage, HttpResponse, ParseError};

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Processes requests with up to `depth` handlers running at once.
    ///
    /// Responses are written in request order no matter which handler finishes first.
    /// When the peer stops sending, whether by closing its send direction, sending a
    /// non keep-alive request or sending something malformed, reading stops, every
    /// request already decoded is still answered, and the channel is closed.
    ///
    /// # Arguments
    ///
    /// * `handler` - Called once per request
    /// * `depth` - Maximum number of requests in flight, at least `1`
    ///
    /// # Errors
    ///
    /// - [`HttpError::RequestError`] for a malformed request (after its error response was
    ///   sent) or a message cut off by the peer
    /// - [`HttpError::ResponseError`] or [`HttpError::ChannelError`] when writing failed
    pub async fn process_pipelined<H: Handler>(&mut self, handler: Arc<H>, depth: usize) -> Result<(), HttpError> {
        let depth = depth.max(1);
        let sender = self.channel.sender();
        let mut in_flight = FuturesUnordered::new();
        let mut queue: PipelineQueue<HttpResponse> = PipelineQueue::with_capacity(depth);
        let mut next_expected = self.decoder.next_sequence();
        let mut reading = true;
        let mut close_when_done = false;
        let mut failure: Option<ParseError> = None;

        loop {
            if !reading && in_flight.is_empty() {
                break;
            }

            select! {
                message = self.decoder.read_message(&mut self.channel, &mut self.segment), if reading && in_flight.len() < depth => {
                    match message {
                        Ok(Some(HttpMessage::Request(request))) => {
                            let keep_alive = request.keep_alive();
                            if !keep_alive {
                                reading = false;
                                close_when_done = true;
                            }
                            let handler = Arc::clone(&handler);
                            in_flight.push(async move { finish_response(answer(handler.as_ref(), request).await, keep_alive) });
                            trace!(channel = %self.channel.id(), in_flight = in_flight.len(), "request dispatched");
                        }
                        Ok(Some(HttpMessage::Response(response))) => {
                            reading = false;
                            failure = Some(ParseError::invalid_start_line(format!("unexpected status line with status {}", response.status())));
                        }
                        Ok(None) => {
                            info!(channel = %self.channel.id(), pending = in_flight.len() + queue.len(), "remote closed the connection");
                            reading = false;
                            close_when_done = true;
                        }
                        Err(e) if e.is_client_error() || matches!(e, ParseError::ChannelDisconnected) => {
                            reading = false;
                            failure = Some(e);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(response) = in_flight.next(), if !in_flight.is_empty() => {
                    queue.enqueue(response)?;
                    while let Some(response) = queue.dequeue_next(next_expected) {
                        self.encoder.send_message(&sender, response.into()).await?;
                        next_expected += 1;
                    }
                }
            }
        }

        if let Some(e) = failure {
            return self.on_parse_error(e).await;
        }
        if close_when_done {
            debug!(channel = %self.channel.id(), "connection is not keep-alive, closing");
            self.channel.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageDecoder;
    use crate::handler::make_handler;
    use crate::protocol::{HttpRequest, Sequenced};
    use bytes::BytesMut;
    use micro_channel::channel::{ChannelBuilder, ChannelConfig};
    use std::error::Error;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_util::codec::Decoder;

    /// Later requests finish first.
    async fn delayed(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
        let delay: u64 = request.uri().path().trim_start_matches('/').parse()?;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let mut response = request.create_response();
        response.set_body(request.uri().path().to_string());
        Ok(response)
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        let (local, mut client) = duplex(4096);
        let config = ChannelConfig::new().close_timeout(Duration::from_millis(100));
        let channel = ChannelBuilder::new().config(config).open(local, None).await.unwrap();
        let mut connection = HttpConnection::new(channel, MessageDecoder::default());
        let server = tokio::spawn(async move { connection.process_pipelined(Arc::new(make_handler(delayed)), 4).await });

        let raw = "GET /60 HTTP/1.1\r\n\r\nGET /30 HTTP/1.1\r\n\r\nGET /0 HTTP/1.1\r\n\r\nGET /10 HTTP/1.1\r\nConnection: close\r\n\r\n";
        client.write_all(raw.as_bytes()).await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        server.await.unwrap().unwrap();

        let mut buffer = BytesMut::from(&received[..]);
        let mut decoder = MessageDecoder::default();
        let mut order = Vec::new();
        while let Some(message) = decoder.decode(&mut buffer).unwrap() {
            let response = message.into_response().unwrap();
            order.push((response.sequence(), String::from_utf8(response.body().bytes().to_vec()).unwrap()));
        }

        let expected = [(Some(0), "/60"), (Some(1), "/30"), (Some(2), "/0"), (Some(3), "/10")];
        assert_eq!(order, expected.map(|(sequence, path)| (sequence, path.to_string())));
    }

    #[tokio::test]
    async fn half_closed_client_still_gets_every_response() {
        let (local, mut client) = duplex(4096);
        let config = ChannelConfig::new().close_timeout(Duration::from_millis(100));
        let channel = ChannelBuilder::new().config(config).open(local, None).await.unwrap();
        let mut connection = HttpConnection::new(channel, MessageDecoder::default());
        let server = tokio::spawn(async move { connection.process_pipelined(Arc::new(make_handler(delayed)), 4).await });

        client.write_all(b"GET /20 HTTP/1.1\r\n\r\nGET /0 HTTP/1.1\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        server.await.unwrap().unwrap();

        let mut buffer = BytesMut::from(&received[..]);
        let mut decoder = MessageDecoder::default();
        let mut bodies = Vec::new();
        while let Some(message) = decoder.decode(&mut buffer).unwrap() {
            bodies.push(message.into_response().unwrap().body().bytes().clone());
        }
        assert_eq!(bodies, [&b"/20"[..], &b"/0"[..]]);
    }

    #[tokio::test]
    async fn malformed_request_answered_after_pending_ones() {
        let (local, mut client) = duplex(4096);
        let config = ChannelConfig::new().close_timeout(Duration::from_millis(100));
        let channel = ChannelBuilder::new().config(config).open(local, None).await.unwrap();
        let mut connection = HttpConnection::new(channel, MessageDecoder::default());
        let server = tokio::spawn(async move { connection.process_pipelined(Arc::new(make_handler(delayed)), 2).await });

        client.write_all(b"GET /20 HTTP/1.1\r\n\r\nFOO /bar\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(server.await.unwrap().is_err());

        let mut buffer = BytesMut::from(&received[..]);
        let mut decoder = MessageDecoder::default();
        let first = decoder.decode(&mut buffer).unwrap().unwrap().into_response().unwrap();
        let second = decoder.decode(&mut buffer).unwrap().unwrap().into_response().unwrap();
        assert_eq!(first.body().bytes().as_ref(), b"/20");
        assert_eq!(second.status(), http::StatusCode::BAD_REQUEST);
    }
}
