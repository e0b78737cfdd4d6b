use std::time::Duration;

/// Default threshold above which staged sends are flushed
pub const DEFAULT_MAX_BYTES_PER_WRITE: usize = 64 * 1024;

/// Default bounded wait for the send lock
pub const DEFAULT_SEND_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for the peer to finish after a half close
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables of a [`BinaryChannel`](super::BinaryChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// `send_queued` flushes once more than this many bytes are staged.
    pub max_bytes_per_write: usize,
    /// Bounded wait for the mutual exclusion guarding sends.
    pub send_lock_timeout: Duration,
    /// How long `close` waits for the peer after half closing the send direction.
    pub close_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_write: DEFAULT_MAX_BYTES_PER_WRITE,
            send_lock_timeout: DEFAULT_SEND_LOCK_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_bytes_per_write(mut self, max_bytes_per_write: usize) -> Self {
        self.max_bytes_per_write = max_bytes_per_write;
        self
    }

    #[must_use]
    pub fn send_lock_timeout(mut self, timeout: Duration) -> Self {
        self.send_lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
