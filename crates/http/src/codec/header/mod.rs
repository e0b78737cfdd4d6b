//! HTTP message head processing
//!
//! # Components
//!
//! - [`HeaderDecoder`]: incremental, split-insensitive parser of the start line and headers
//!   - Distinguishes request lines from status lines by the position of the `HTTP/` token
//!   - Enforces header count and size limits
//!   - Extracts cookies
//!
//! - [`HeaderEncoder`]: serializes the start line and headers of a prepared message

mod header_decoder;
mod header_encoder;
mod start_line;

pub(crate) use header_decoder::{HeaderDecoder, MessageHead};
pub(crate) use header_encoder::HeaderEncoder;
pub(crate) use start_line::StartLine;
