//! Connection oriented byte transport with pooled buffers and optional TLS
//!
//! This crate provides the transport layer underneath an HTTP/1.x codec: a channel over a
//! single connected stream, the pooled buffer segments it reads into and writes from, and
//! the TLS builders that wrap a raw stream before a channel takes it over.
//!
//! # Example
//!
//! ```no_run
//! use micro_channel::channel::{ChannelBuilder, ChannelIdGenerator};
//! use micro_channel::buffer::BufferPool;
//! use tokio::net::TcpListener;
//! use tracing::{info, warn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = TcpListener::bind("127.0.0.1:9000").await?;
//!     let pool = BufferPool::default();
//!     let ids = ChannelIdGenerator::new();
//!
//!     loop {
//!         let (tcp_stream, remote_addr) = match listener.accept().await {
//!             Ok(accepted) => accepted,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let builder = ChannelBuilder::new().id(ids.next_id()).pool(pool.clone());
//!         tokio::spawn(async move {
//!             let mut channel = builder.open(tcp_stream, Some(remote_addr)).await?;
//!             let mut segment = channel.pool().lease();
//!             while channel.receive(&mut segment).await? > 0 {
//!                 channel.send(segment.unread()).await?;
//!                 segment.reset();
//!             }
//!             channel.close().await?;
//!             info!(channel = %channel.id(), "echo finished");
//!             Ok::<_, micro_channel::ChannelError>(())
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: slab backed [`buffer::BufferPool`] and the [`buffer::BufferSegment`]s it leases
//! - [`channel`]: [`channel::BinaryChannel`], its lifecycle, events and per connection data
//! - [`tls`]: server and client handshake builders on top of `rustls`
//!
//! # Error Handling
//!
//! - [`ChannelError`]: transport failures, fatal for the connection they occur on
//! - [`TlsError`]: configuration and handshake failures

pub mod buffer;
pub mod channel;
pub mod tls;

mod error;
pub use error::{ChannelError, TlsError};

mod utils;
pub(crate) use utils::ensure;
