//! HTTP/1.x wire codec
//!
//! - [`MessageDecoder`]: incremental decoding of requests and responses, insensitive to how
//!   the input is split across reads
//! - [`MessageEncoder`]: head serialisation and segment filling with partial send resumption
//!
//! Both also implement the `tokio_util` codec traits for whole-message use over a `BytesMut`.
//!
//! # Example
//!
//! ```
//! use micro_channel_http::codec::{MessageDecoder, MessageEncoder};
//! use micro_channel_http::protocol::{HttpMessage, HttpResponse};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! let mut buffer = BytesMut::new();
//! MessageEncoder::new().encode(HttpMessage::from(HttpResponse::with_body(http::StatusCode::OK, "hi")), &mut buffer).unwrap();
//!
//! let response = MessageDecoder::default().decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(response.body().bytes().as_ref(), b"hi");
//! ```

mod header;
mod message_decoder;
mod message_encoder;

pub use message_decoder::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_HEADERS};
pub use message_decoder::{DecodeState, DecoderConfig, MessageDecoder};
pub use message_encoder::MessageEncoder;
