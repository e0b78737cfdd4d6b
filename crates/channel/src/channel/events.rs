use std::error::Error;
use std::sync::Arc;

use tracing::{info, warn};

use super::ChannelId;
use crate::ChannelError;

/// Callbacks a channel reports its lifecycle through.
///
/// One subscriber is injected per channel at construction time.
pub trait ChannelEvents: Send + Sync {
    /// Called exactly once per channel lifetime, when the channel stops being usable.
    ///
    /// `cause` is `None` for an orderly close from either side.
    fn on_disconnect(&self, id: ChannelId, cause: Option<&ChannelError>) {
        let _ = (id, cause);
    }

    /// Called when the protocol running on top of the channel hits an unrecoverable failure.
    fn on_failure(&self, id: ChannelId, error: &(dyn Error + Send + Sync)) {
        let _ = (id, error);
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ChannelEvents for NoopEvents {}

/// Reports events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEvents;

impl ChannelEvents for LoggingEvents {
    fn on_disconnect(&self, id: ChannelId, cause: Option<&ChannelError>) {
        match cause {
            Some(e) => warn!(channel = %id, cause = %e, "channel disconnected"),
            None => info!(channel = %id, "channel disconnected"),
        }
    }

    fn on_failure(&self, id: ChannelId, error: &(dyn Error + Send + Sync)) {
        warn!(channel = %id, cause = %error, "channel failure");
    }
}

impl<T: ChannelEvents + ?Sized> ChannelEvents for Arc<T> {
    fn on_disconnect(&self, id: ChannelId, cause: Option<&ChannelError>) {
        (**self).on_disconnect(id, cause);
    }

    fn on_failure(&self, id: ChannelId, error: &(dyn Error + Send + Sync)) {
        (**self).on_failure(id, error);
    }
}
