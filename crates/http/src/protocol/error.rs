use std::io;

use http::StatusCode;
use micro_channel::{ChannelError, TlsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("pipeline error: {source}")]
    PipelineError {
        #[from]
        source: PipelineError,
    },

    #[error("channel error: {source}")]
    ChannelError {
        #[from]
        source: ChannelError,
    },

    #[error("tls error: {source}")]
    TlsError {
        #[from]
        source: TlsError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid start line: {line:?}")]
    InvalidStartLine { line: String },

    #[error("invalid status code: {code:?}")]
    InvalidStatusCode { code: String },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {version:?}")]
    InvalidVersion { version: String },

    #[error("invalid http method: {method:?}")]
    InvalidMethod { method: String },

    #[error("invalid http uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("transfer-encoding is not supported")]
    UnsupportedTransferEncoding,

    #[error("body size too large, content-length: {length} exceed the limit {max_size}")]
    TooLargeBody { length: u64, max_size: usize },

    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("channel disconnected mid-message")]
    ChannelDisconnected,

    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_start_line<S: ToString>(line: S) -> Self {
        Self::InvalidStartLine { line: line.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unsupported_content_type<S: ToString>(content_type: S) -> Self {
        Self::UnsupportedContentType { content_type: content_type.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The status of the error response sent back for this failure.
    ///
    /// `None` when the failure came from the transport, in which case nothing can be sent.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            Self::TooLargeBody { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::ChannelDisconnected | Self::Channel { .. } | Self::Io { .. } => None,
            _ => Some(StatusCode::BAD_REQUEST),
        }
    }

    /// Returns true when the peer sent something malformed, as opposed to a transport failure.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_some()
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("message has not been prepared")]
    NotPrepared,

    #[error("message already prepared and not yet sent")]
    AlreadyPrepared,

    #[error("reported {reported} sent bytes but only {pending} bytes were pending")]
    Overrun { reported: usize, pending: usize },

    #[error("unsupported http version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("message has no pipeline sequence")]
    MissingSequence,
}
