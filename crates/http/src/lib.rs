//! HTTP/1.x on top of `micro-channel`
//!
//! This crate provides the HTTP wire codec and the per-connection loops that run over a
//! [`BinaryChannel`](micro_channel::channel::BinaryChannel), plain or TLS wrapped.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 with `Content-Length` framing
//! - Incremental decoding, insensitive to how the input is split across reads
//! - Response encoding with partial send resumption
//! - Pipelining with responses written strictly in request order
//! - Optional TLS termination, handshake inside the connection task
//! - Form body decoding (`application/x-www-form-urlencoded`, `multipart/form-data`)
//! - Cookies on requests and responses
//!
//! # Example
//!
//! ```no_run
//! use micro_channel_http::handler::make_handler;
//! use micro_channel_http::protocol::{HttpRequest, HttpResponse};
//! use micro_channel_http::server::HttpServer;
//! use std::error::Error;
//! use tracing::{Level, error, info};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let server = match HttpServer::builder().address("127.0.0.1:8080").pipelining(16).build() {
//!         Ok(server) => server,
//!         Err(e) => {
//!             error!(cause = %e, "invalid server configuration");
//!             return;
//!         }
//!     };
//!
//!     if let Err(e) = server.start(make_handler(hello_world)).await {
//!         error!(cause = %e, "server stopped");
//!     }
//! }
//!
//! async fn hello_world(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
//!     info!(path = request.uri().path(), "receiving request");
//!     let mut response = request.create_response();
//!     response.set_body("Hello World!\r\n");
//!     Ok(response)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: message model, cookies, pipelining sequence and error types
//! - [`codec`]: [`MessageDecoder`](codec::MessageDecoder) and [`MessageEncoder`](codec::MessageEncoder)
//! - [`form`]: body deserializers keyed by content type
//! - [`pipeline`]: reordering queue for pipelined responses
//! - [`handler`]: the [`Handler`](handler::Handler) trait and [`make_handler`](handler::make_handler)
//! - [`connection`]: server and client connection loops
//! - [`server`]: the listener
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Decoding errors, malformed input is answered with `400`, `413` or `431`
//! - [`protocol::SendError`]: Encoding and sending errors
//!
//! Errors never cross the connection task: they are logged and the connection is closed.
//!
//! # Limitations
//!
//! - No HTTP/2, no chunked transfer encoding
//! - Maximum header size: 8KB by default
//! - Maximum number of headers: 64 by default
//! - Maximum body size: 8MB by default

pub mod codec;
pub mod connection;
pub mod form;
pub mod handler;
pub mod pipeline;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
