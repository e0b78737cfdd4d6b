use micro_channel::buffer::BufferSegment;
use micro_channel::channel::{BinaryChannel, ChannelBuilder, MaybeTlsStream};
use micro_channel::tls::ClientStreamBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

use crate::codec::{DecoderConfig, MessageDecoder, MessageEncoder};
use crate::protocol::{HttpError, HttpMessage, HttpRequest, HttpResponse, ParseError};

/// The client side of an HTTP connection.
///
/// Requests are sent one at a time; [`send`](Self::send) waits for the response before
/// returning.
pub struct HttpClient<S> {
    channel: BinaryChannel<S>,
    segment: BufferSegment,
    decoder: MessageDecoder,
    encoder: MessageEncoder,
}

impl HttpClient<MaybeTlsStream<TcpStream>> {
    /// Connects to `addr`, running the TLS handshake first when `tls` is given.
    pub async fn connect<A: ToSocketAddrs>(addr: A, tls: Option<&ClientStreamBuilder>) -> Result<Self, HttpError> {
        let channel = ChannelBuilder::new().connect(addr, tls).await?;
        Ok(Self::new(channel))
    }
}

impl<S> HttpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: BinaryChannel<S>) -> Self {
        let segment = channel.pool().lease();
        Self { channel, segment, decoder: MessageDecoder::new(DecoderConfig::default()), encoder: MessageEncoder::new() }
    }

    pub fn channel(&self) -> &BinaryChannel<S> {
        &self.channel
    }

    /// Sends `request` and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The request can't be encoded or sent
    /// - The peer answers with something that is not a valid response
    /// - The peer closes before a complete response arrived
    pub async fn send(&mut self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        trace!(channel = %self.channel.id(), method = %request.method(), uri = %request.uri(), "send request");
        let sender = self.channel.sender();
        self.encoder.send_message(&sender, request.into()).await?;

        match self.decoder.read_message(&mut self.channel, &mut self.segment).await? {
            Some(HttpMessage::Response(response)) => Ok(response),
            Some(HttpMessage::Request(request)) => {
                Err(ParseError::invalid_start_line(format!("{} {} where a status line was expected", request.method(), request.uri())).into())
            }
            None => Err(ParseError::ChannelDisconnected.into()),
        }
    }

    pub async fn close(&mut self) -> Result<(), HttpError> {
        self.channel.close().await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for HttpClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("channel", &self.channel).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Cookie;
    use http::{StatusCode, Uri};
    use indoc::indoc;

    #[tokio::test]
    async fn request_and_response() {
        let response = indoc! {"
            HTTP/1.1 200 OK\r
            Content-Length: 2\r
            Set-Cookie: session=abc; Path=/\r
            \r
            ok"};
        let mock = tokio_test::io::Builder::new()
            .write(b"GET /status HTTP/1.1\r\nhost: example.com\r\ncontent-length: 0\r\n\r\n")
            .read(response.as_bytes())
            .build();
        let channel = ChannelBuilder::new().open(mock, None).await.unwrap();
        let mut client = HttpClient::new(channel);

        let response = client.send(HttpRequest::get(Uri::from_static("http://example.com/status"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().bytes().as_ref(), b"ok");
        assert_eq!(response.cookie("session"), Some(&Cookie::new("session", "abc").path("/")));
    }

    #[tokio::test]
    async fn closed_before_response() {
        let mock = tokio_test::io::Builder::new().write(b"GET / HTTP/1.1\r\ncontent-length: 0\r\n\r\n").build();
        let channel = ChannelBuilder::new().open(mock, None).await.unwrap();
        let mut client = HttpClient::new(channel);

        let error = client.send(HttpRequest::get(Uri::from_static("/"))).await.unwrap_err();
        assert!(matches!(error, HttpError::RequestError { source: ParseError::ChannelDisconnected }));
    }
}
