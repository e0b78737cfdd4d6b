//! The listener: accepts connections and runs an [`HttpConnection`](crate::connection::HttpConnection)
//! per connection in its own task.

mod config;
mod server;

pub use config::ServerConfig;
pub use server::{HttpServer, ServerBuildError, ServerBuilder};
