//! HTTP message model shared by the decoder, the encoder and the connection loops.
//!
//! - **Messages**: [`HttpMessage`] is either a [`HttpRequest`] or a
//!   [`HttpResponse`], both wrapping the `http` crate types with a buffered [`MessageBody`]
//! - **Cookies**: [`Cookie`] parsed from `Cookie` and `Set-Cookie` headers
//! - **Pipelining**: the [`Sequenced`] trait and the [`PIPELINE_SEQUENCE`] header
//! - **Errors**:
//!   - [`HttpError`]: Top-level error type
//!   - [`ParseError`]: Decoding errors, each mapped to a response status
//!   - [`SendError`]: Encoding and sending errors
//!   - [`PipelineError`]: Pipeline queue misuse

mod message;
pub use message::HttpMessage;

mod request;
pub use request::HttpRequest;

mod response;
pub use response::HttpResponse;

mod body;
pub use body::MessageBody;

mod cookie;
pub use cookie::Cookie;

mod sequence;
pub use sequence::PIPELINE_SEQUENCE;
pub use sequence::Sequenced;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::PipelineError;
pub use error::SendError;
