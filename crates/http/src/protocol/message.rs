use http::{HeaderMap, Version};

use super::sequence::Sequenced;
use super::{Cookie, HttpRequest, HttpResponse, MessageBody};

/// A decoded or to-be-encoded HTTP message.
///
/// The decoder produces requests on the server side and responses on the client side; the
/// encoder accepts either.
#[derive(Debug)]
pub enum HttpMessage {
    Request(HttpRequest),
    Response(HttpResponse),
}

impl HttpMessage {
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, HttpMessage::Request(_))
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        matches!(self, HttpMessage::Response(_))
    }

    pub fn version(&self) -> Version {
        match self {
            HttpMessage::Request(request) => request.version(),
            HttpMessage::Response(response) => response.version(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            HttpMessage::Request(request) => request.headers(),
            HttpMessage::Response(response) => response.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            HttpMessage::Request(request) => request.headers_mut(),
            HttpMessage::Response(response) => response.headers_mut(),
        }
    }

    pub fn body(&self) -> &MessageBody {
        match self {
            HttpMessage::Request(request) => request.body(),
            HttpMessage::Response(response) => response.body(),
        }
    }

    pub fn cookies(&self) -> &[Cookie] {
        match self {
            HttpMessage::Request(request) => request.cookies(),
            HttpMessage::Response(response) => response.cookies(),
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        content_length(self.headers())
    }

    pub fn into_request(self) -> Option<HttpRequest> {
        match self {
            HttpMessage::Request(request) => Some(request),
            HttpMessage::Response(_) => None,
        }
    }

    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            HttpMessage::Request(_) => None,
            HttpMessage::Response(response) => Some(response),
        }
    }
}

impl Sequenced for HttpMessage {
    fn sequence(&self) -> Option<u64> {
        match self {
            HttpMessage::Request(request) => request.sequence(),
            HttpMessage::Response(response) => response.sequence(),
        }
    }
}

impl From<HttpRequest> for HttpMessage {
    fn from(request: HttpRequest) -> Self {
        HttpMessage::Request(request)
    }
}

impl From<HttpResponse> for HttpMessage {
    fn from(response: HttpResponse) -> Self {
        HttpMessage::Response(response)
    }
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(http::header::CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}
