use micro_channel::buffer::BufferPoolConfig;
use micro_channel::channel::ChannelConfig;

use crate::codec::DecoderConfig;

/// Settings applied to every accepted connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of requests handled concurrently per connection, `0` or `1` is sequential.
    pub pipelining: usize,
    pub channel: ChannelConfig,
    pub decoder: DecoderConfig,
    pub pool: BufferPoolConfig,
}

impl ServerConfig {
    #[must_use]
    pub fn pipelining(mut self, depth: usize) -> Self {
        self.pipelining = depth;
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: BufferPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn is_pipelined(&self) -> bool {
        self.pipelining > 1
    }
}
