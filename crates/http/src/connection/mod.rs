//! Per-connection processing loops
//!
//! - [`HttpConnection`]: server side, binds a channel to a decoder, an encoder and a handler
//!   - sequential mode answers one request at a time
//!   - pipelined mode runs several handlers concurrently and reorders their responses
//! - [`HttpClient`]: client side, sends a request and waits for its response
//!
//! Malformed requests get a best-effort error response carrying the status from
//! [`ParseError::status_code`](crate::protocol::ParseError::status_code), after which the
//! channel is closed. Transport failures end the loop without a response.

mod client;
mod http_connection;
mod pipelined;

pub use client::HttpClient;
pub use http_connection::HttpConnection;
