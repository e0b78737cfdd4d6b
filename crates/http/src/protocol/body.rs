//! The fully buffered body carried by decoded and encoded messages.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

/// A complete message body.
///
/// Bodies are read to the last byte before a message is handed out, so the data is
/// always available through [`MessageBody::bytes`]. As an [`http_body::Body`] it yields
/// the data as a single frame; [`MessageBody::rewind`] makes it readable again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    data: Bytes,
    consumed: bool,
}

impl MessageBody {
    pub fn new(data: Bytes) -> Self {
        Self { data, consumed: false }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn rewind(&mut self) {
        self.consumed = false;
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Body for MessageBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.is_end_stream() {
            return Poll::Ready(None);
        }
        self.consumed = true;
        Poll::Ready(Some(Ok(Frame::data(self.data.clone()))))
    }

    fn is_end_stream(&self) -> bool {
        self.consumed || self.data.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        if self.is_end_stream() { SizeHint::with_exact(0) } else { SizeHint::with_exact(self.data.len() as u64) }
    }
}

impl From<Bytes> for MessageBody {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for MessageBody {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }
}

impl From<String> for MessageBody {
    fn from(data: String) -> Self {
        Self::new(Bytes::from(data))
    }
}

impl From<&'static str> for MessageBody {
    fn from(data: &'static str) -> Self {
        Self::new(Bytes::from_static(data.as_bytes()))
    }
}

impl From<&'static [u8]> for MessageBody {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

impl From<()> for MessageBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}
