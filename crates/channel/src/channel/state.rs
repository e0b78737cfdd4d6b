use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`BinaryChannel`](super::BinaryChannel).
///
/// ```text
/// Opening --assign--> Open --close--> Closing ----------> Closed
///                      |                                   ^
///                      +--remote close--> Disconnecting ---+ (close)
///                      +--io failure-----------------------+
/// ```
///
/// `reset` moves any state back to `Opening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Opening = 0,
    Open = 1,
    Closing = 2,
    Disconnecting = 3,
    Closed = 4,
}

impl ChannelState {
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, ChannelState::Open)
    }

    /// Open, or closed by the remote side with the send direction still usable.
    #[inline]
    pub fn can_send(self) -> bool {
        matches!(self, ChannelState::Open | ChannelState::Disconnecting)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Opening,
            1 => ChannelState::Open,
            2 => ChannelState::Closing,
            3 => ChannelState::Disconnecting,
            _ => ChannelState::Closed,
        }
    }
}

/// Channel state shared between the channel and its senders.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
