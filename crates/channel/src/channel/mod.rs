//! Connected byte channels and their lifecycle.
//!
//! A [`BinaryChannel`] wraps one stream, plain or TLS, and moves through the states of
//! [`ChannelState`]. Receives fill pooled [`BufferSegment`](crate::buffer::BufferSegment)s,
//! sends go through a bounded wait on a single writer lock, and the injected
//! [`ChannelEvents`] subscriber hears about the disconnect exactly once per lifetime.

mod binary_channel;
mod config;
mod data;
mod events;
mod id;
mod state;
mod stream;

pub use binary_channel::BinaryChannel;
pub use binary_channel::ChannelBuilder;
pub use binary_channel::ChannelSender;
pub use config::ChannelConfig;
pub use config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_MAX_BYTES_PER_WRITE, DEFAULT_SEND_LOCK_TIMEOUT};
pub use data::ChannelData;
pub use events::{ChannelEvents, LoggingEvents, NoopEvents};
pub use id::{ChannelId, ChannelIdGenerator};
pub use state::ChannelState;
pub use stream::MaybeTlsStream;

pub(crate) use state::AtomicState;
