use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelState;

/// Transport level failures of a [`BinaryChannel`](crate::channel::BinaryChannel).
///
/// Every variant is fatal for the connection it was raised on; the channel is closed
/// and the disconnect callback is notified before the error reaches the caller.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("tls error: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },

    #[error("channel is not connected")]
    NotConnected,

    #[error("channel is closed")]
    Closed,

    #[error("channel in state {state:?} can't be assigned a new stream")]
    InvalidState { state: ChannelState },

    #[error("waited {timeout:?} for the send lock")]
    SendLockTimeout { timeout: Duration },

    #[error("send side did not finish within {timeout:?}, stream closed forcibly")]
    CloseTimeout { timeout: Duration },

    #[error("receive buffer is full, capacity: {capacity}")]
    BufferFull { capacity: usize },
}

impl ChannelError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Returns true when the error originates from the underlying transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Tls { .. })
    }
}

/// Errors raised while building or running a TLS stream.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("tls handshake did not complete within {timeout:?}")]
    HandshakeTimeout { timeout: Duration },

    #[error("tls handshake failed: {source}")]
    HandshakeFailed { source: io::Error },

    #[error("remote certificate rejected: {reason}")]
    CertificateRejected { reason: String },

    #[error("invalid certificate: {reason}")]
    InvalidCertificate { reason: String },

    #[error("invalid private key: {reason}")]
    InvalidPrivateKey { reason: String },

    #[error("invalid server name: {name}")]
    InvalidServerName { name: String },

    #[error("tls configuration error: {reason}")]
    Configuration { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("rustls error: {source}")]
    Rustls {
        #[from]
        source: rustls::Error,
    },
}

impl TlsError {
    pub fn configuration<S: ToString>(reason: S) -> Self {
        Self::Configuration { reason: reason.to_string() }
    }

    pub fn invalid_certificate<S: ToString>(reason: S) -> Self {
        Self::InvalidCertificate { reason: reason.to_string() }
    }

    pub fn invalid_private_key<S: ToString>(reason: S) -> Self {
        Self::InvalidPrivateKey { reason: reason.to_string() }
    }
}
