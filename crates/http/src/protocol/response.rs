//! HTTP response message.

use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};

use super::sequence::{Sequenced, read_sequence, write_sequence};
use super::{Cookie, MessageBody};

/// Wraps an `http::Response` with a fully buffered body, its cookies and the reason phrase
/// received on the wire.
#[derive(Debug)]
pub struct HttpResponse {
    inner: Response<MessageBody>,
    reason: Option<String>,
    cookies: Vec<Cookie>,
}

impl AsRef<Response<MessageBody>> for HttpResponse {
    fn as_ref(&self) -> &Response<MessageBody> {
        &self.inner
    }
}

impl AsMut<Response<MessageBody>> for HttpResponse {
    fn as_mut(&mut self) -> &mut Response<MessageBody> {
        &mut self.inner
    }
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        let mut inner = Response::new(MessageBody::empty());
        *inner.status_mut() = status;
        Self::from(inner)
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn with_body(status: StatusCode, body: impl Into<MessageBody>) -> Self {
        let mut response = Self::new(status);
        response.set_body(body);
        response
    }

    pub fn into_inner(self) -> Response<MessageBody> {
        self.inner
    }

    pub fn into_parts(self) -> (Parts, MessageBody) {
        self.inner.into_parts()
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        *self.inner.status_mut() = status;
    }

    /// The reason phrase: the one received on the wire or set explicitly, otherwise the
    /// canonical phrase of the status code.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().or_else(|| self.status().canonical_reason()).unwrap_or_default()
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    pub fn body(&self) -> &MessageBody {
        self.inner.body()
    }

    pub fn body_mut(&mut self) -> &mut MessageBody {
        self.inner.body_mut()
    }

    pub fn set_body(&mut self, body: impl Into<MessageBody>) {
        *self.inner.body_mut() = body.into();
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|cookie| cookie.name == name)
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn content_length(&self) -> Option<u64> {
        super::message::content_length(self.headers())
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        write_sequence(self.inner.headers_mut(), sequence);
    }
}

impl Sequenced for HttpResponse {
    fn sequence(&self) -> Option<u64> {
        read_sequence(self.headers())
    }
}

impl<B: Into<MessageBody>> From<Response<B>> for HttpResponse {
    fn from(response: Response<B>) -> Self {
        Self { inner: response.map(Into::into), reason: None, cookies: Vec::new() }
    }
}

impl From<Parts> for HttpResponse {
    fn from(parts: Parts) -> Self {
        Self::from(Response::from_parts(parts, MessageBody::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrase() {
        let mut response = HttpResponse::new(StatusCode::NOT_FOUND);
        assert_eq!(response.reason(), "Not Found");

        response.set_reason("Nothing Here");
        assert_eq!(response.reason(), "Nothing Here");

        let unknown = HttpResponse::new(StatusCode::from_u16(599).unwrap());
        assert_eq!(unknown.reason(), "");
    }

    #[test]
    fn from_http_response() {
        let response: HttpResponse = Response::builder().status(StatusCode::CREATED).body("done").unwrap().into();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body().bytes().as_ref(), b"done");
    }
}
