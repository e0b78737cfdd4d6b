use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use micro_channel::TlsError;
use micro_channel::buffer::BufferPool;
use micro_channel::channel::{ChannelBuilder, ChannelEvents, ChannelIdGenerator, LoggingEvents, MaybeTlsStream};
use micro_channel::tls::{ServerStreamBuilder, ServerTlsConfig};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::ServerConfig;
use crate::codec::MessageDecoder;
use crate::connection::HttpConnection;
use crate::form::BodyDeserializer;
use crate::handler::Handler;

pub struct ServerBuilder {
    address: Option<io::Result<Vec<SocketAddr>>>,
    tls: Option<ServerTlsConfig>,
    config: ServerConfig,
    deserializer: Option<Arc<dyn BodyDeserializer>>,
    events: Arc<dyn ChannelEvents>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, tls: None, config: ServerConfig::default(), deserializer: None, events: Arc::new(LoggingEvents) }
    }

    #[must_use]
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    /// Terminates TLS on every accepted connection.
    #[must_use]
    pub fn tls(mut self, tls: ServerTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn pipelining(mut self, depth: usize) -> Self {
        self.config = self.config.pipelining(depth);
        self
    }

    #[must_use]
    pub fn deserializer(mut self, deserializer: impl BodyDeserializer + 'static) -> Self {
        self.deserializer = Some(Arc::new(deserializer));
        self
    }

    #[must_use]
    pub fn events(mut self, events: impl ChannelEvents + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn build(self) -> Result<HttpServer, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(|source| ServerBuildError::InvalidAddress { source })?;
        let tls = self.tls.as_ref().map(ServerStreamBuilder::new).transpose()?;

        Ok(HttpServer {
            address,
            tls,
            config: self.config,
            deserializer: self.deserializer,
            events: self.events,
            pool: BufferPool::new(self.config.pool),
            ids: ChannelIdGenerator::new(),
        })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("address", &self.address).field("tls", &self.tls.is_some()).field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,

    #[error("address can't be resolved: {source}")]
    InvalidAddress { source: io::Error },

    #[error("invalid tls configuration: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },
}

/// Accepts connections and runs one task per connection.
///
/// The TLS handshake, when configured, runs inside the connection task so a slow handshake
/// never blocks the accept loop.
pub struct HttpServer {
    address: Vec<SocketAddr>,
    tls: Option<ServerStreamBuilder>,
    config: ServerConfig,
    deserializer: Option<Arc<dyn BodyDeserializer>>,
    events: Arc<dyn ChannelEvents>,
    pool: BufferPool,
    ids: ChannelIdGenerator,
}

impl HttpServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves connections until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the address can't be bound. Failures of single connections are
    /// logged and never end the server.
    pub async fn start<H: Handler + 'static>(self, handler: H) -> io::Result<()> {
        info!(address = ?self.address, tls = self.tls.is_some(), "start listening");
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };

        self.serve(tcp_listener, handler).await;
        Ok(())
    }

    /// Serves connections accepted from an already bound listener.
    pub async fn serve<H: Handler + 'static>(self, tcp_listener: TcpListener, handler: H) {
        let server = Arc::new(self);
        let handler = Arc::new(handler);

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let server = Arc::clone(&server);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { server.serve_connection(tcp_stream, remote_addr, handler).await });
        }
    }

    async fn serve_connection<H: Handler>(&self, tcp_stream: TcpStream, remote_addr: SocketAddr, handler: Arc<H>) {
        if let Err(e) = tcp_stream.set_nodelay(true) {
            debug!(remote = %remote_addr, cause = %e, "can't set nodelay");
        }

        let stream = match &self.tls {
            Some(tls) => match tls.build(tcp_stream).await {
                Ok(tls_stream) => MaybeTlsStream::from(tls_stream),
                Err(e) => {
                    warn!(remote = %remote_addr, cause = %e, "tls handshake failed");
                    return;
                }
            },
            None => MaybeTlsStream::Plain(tcp_stream),
        };
        let secure = stream.is_tls();

        let channel = ChannelBuilder::new()
            .id(self.ids.next_id())
            .pool(self.pool.clone())
            .config(self.config.channel)
            .events(Arc::clone(&self.events))
            .open(stream, Some(remote_addr))
            .await;
        let channel = match channel {
            Ok(channel) => channel,
            Err(e) => {
                error!(remote = %remote_addr, cause = %e, "can't open channel");
                return;
            }
        };
        let channel_id = channel.id();

        let mut decoder = MessageDecoder::new(self.config.decoder.secure(secure));
        if let Some(deserializer) = &self.deserializer {
            decoder = decoder.with_deserializer(Arc::clone(deserializer));
        }

        let mut connection = HttpConnection::new(channel, decoder);
        let result = if self.config.is_pipelined() {
            connection.process_pipelined(handler, self.config.pipelining).await
        } else {
            connection.process(handler).await
        };

        match result {
            Ok(()) => info!(channel = %channel_id, "finished process, connection shutdown"),
            Err(e) => error!(channel = %channel_id, cause = %e, "service has error, connection shutdown"),
        }
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("address", &self.address)
            .field("tls", &self.tls.is_some())
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::HttpClient;
    use crate::form::CompositeDeserializer;
    use crate::handler::make_handler;
    use crate::protocol::{HttpRequest, HttpResponse, Sequenced};
    use http::{StatusCode, Uri};
    use micro_channel::channel::ChannelConfig;
    use micro_channel::tls::{ClientStreamBuilder, ClientTlsConfig, certificates_from_pem, private_key_from_pem};
    use std::error::Error;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;

    const SERVER_CRT: &[u8] = include_bytes!("../../../channel/tests/fixtures/server.crt");
    const SERVER_KEY: &[u8] = include_bytes!("../../../channel/tests/fixtures/server.key");

    async fn greet(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
        let name = match request.decoded_body() {
            Some(form) => form.param("name").unwrap_or("nobody").to_string(),
            None => request.uri().path().trim_start_matches('/').to_string(),
        };
        let mut response = request.create_response();
        response.set_body(format!("hello {name} over {}", request.uri().scheme_str().unwrap_or("?")));
        Ok(response)
    }

    async fn spawn(builder: ServerBuilder) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = builder.address(addr).build().unwrap();
        (addr, tokio::spawn(server.serve(listener, make_handler(greet))))
    }

    #[test]
    fn build_requires_address() {
        assert!(matches!(HttpServer::builder().build(), Err(ServerBuildError::MissingAddress)));
        assert!(matches!(HttpServer::builder().address("not an address").build(), Err(ServerBuildError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn plain_round_trip() {
        let (addr, server) = spawn(HttpServer::builder().deserializer(CompositeDeserializer::default())).await;

        let mut client = HttpClient::connect(addr, None).await.unwrap();
        let response = client.send(HttpRequest::get(Uri::from_static("http://localhost/zava"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().bytes().as_ref(), b"hello zava over http");

        let mut form = HttpRequest::post(Uri::from_static("http://localhost/form"), "name=form");
        form.headers_mut().insert(http::header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref().parse().unwrap());
        let response = client.send(form).await.unwrap();
        assert_eq!(response.body().bytes().as_ref(), b"hello form over http");

        client.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn pipelined_responses_in_order() {
        let config = ServerConfig::default().pipelining(8).channel(ChannelConfig::new().close_timeout(Duration::from_millis(100)));
        let (addr, server) = spawn(HttpServer::builder().config(config)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut raw = String::new();
        for i in 0..5 {
            raw.push_str(&format!("GET /{i} HTTP/1.1\r\nHost: localhost\r\n\r\n"));
        }
        raw.push_str("GET /last HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();

        let mut buffer = bytes::BytesMut::from(&received[..]);
        let mut decoder = MessageDecoder::default();
        let mut sequences = Vec::new();
        while let Some(message) = tokio_util::codec::Decoder::decode(&mut decoder, &mut buffer).unwrap() {
            sequences.push(message.sequence());
        }
        assert_eq!(sequences, (0..6).map(Some).collect::<Vec<_>>());
        server.abort();
    }

    #[tokio::test]
    async fn tls_round_trip() {
        let tls = ServerTlsConfig::new(certificates_from_pem(SERVER_CRT).unwrap(), private_key_from_pem(SERVER_KEY).unwrap());
        let (addr, server) = spawn(HttpServer::builder().tls(tls)).await;

        let pinned = certificates_from_pem(SERVER_CRT).unwrap().remove(0);
        let client_tls = ClientStreamBuilder::new(&ClientTlsConfig::new("localhost").expected_certificate(pinned)).unwrap();
        let mut client = HttpClient::connect(addr, Some(&client_tls)).await.unwrap();

        let response = client.send(HttpRequest::get(Uri::from_static("https://localhost/secure"))).await.unwrap();
        assert_eq!(response.body().bytes().as_ref(), b"hello secure over https");
        server.abort();
    }
}
