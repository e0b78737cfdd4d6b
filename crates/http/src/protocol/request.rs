//! HTTP request message.
//!
//! [`HttpRequest`] wraps an `http::Request` carrying a fully buffered [`MessageBody`], plus
//! what the decoder extracts on the way: parsed cookies, the pipelining sequence and an
//! optional structured body.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use serde::de::DeserializeOwned;

use super::sequence::{Sequenced, read_sequence, write_sequence};
use super::{Cookie, HttpResponse, MessageBody};
use crate::form::{DecodedBody, DeserializeError};

#[derive(Debug)]
pub struct HttpRequest {
    inner: Request<MessageBody>,
    cookies: Vec<Cookie>,
    decoded_body: Option<DecodedBody>,
}

impl AsRef<Request<MessageBody>> for HttpRequest {
    fn as_ref(&self) -> &Request<MessageBody> {
        &self.inner
    }
}

impl AsMut<Request<MessageBody>> for HttpRequest {
    fn as_mut(&mut self) -> &mut Request<MessageBody> {
        &mut self.inner
    }
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        let mut inner = Request::new(MessageBody::empty());
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;
        Self::from(inner)
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: Uri, body: impl Into<MessageBody>) -> Self {
        let mut request = Self::new(Method::POST, uri);
        request.set_body(body);
        request
    }

    pub fn into_inner(self) -> Request<MessageBody> {
        self.inner
    }

    pub fn into_parts(self) -> (Parts, MessageBody) {
        self.inner.into_parts()
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
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

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri().query()
    }

    /// Decoded query pairs in the order they appear. A malformed query yields no pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query().and_then(|query| serde_urlencoded::from_str(query).ok()).unwrap_or_default()
    }

    /// Deserializes the query string into `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, DeserializeError> {
        serde_urlencoded::from_str(self.query().unwrap_or_default()).map_err(DeserializeError::malformed)
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

    /// The structured body, present when a body deserializer handled the content type.
    pub fn decoded_body(&self) -> Option<&DecodedBody> {
        self.decoded_body.as_ref()
    }

    pub fn set_decoded_body(&mut self, decoded_body: DecodedBody) {
        self.decoded_body = Some(decoded_body);
    }

    /// The declared `Content-Length`, if present and valid.
    pub fn content_length(&self) -> Option<u64> {
        super::message::content_length(self.headers())
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        write_sequence(self.inner.headers_mut(), sequence);
    }

    /// Creates a `200 OK` response that echoes this request's version and pipelining sequence.
    pub fn create_response(&self) -> HttpResponse {
        let mut response = HttpResponse::ok();
        *response.as_mut().version_mut() = self.version();
        if let Some(sequence) = self.sequence() {
            response.set_sequence(sequence);
        }
        response
    }

    /// Determines whether the connection stays open after this request is answered.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers().get(http::header::CONNECTION).and_then(|value| value.to_str().ok());
        match self.version() {
            Version::HTTP_10 => connection.is_some_and(|value| value.eq_ignore_ascii_case("keep-alive")),
            _ => !connection.is_some_and(|value| value.eq_ignore_ascii_case("close")),
        }
    }

    pub(crate) fn set_cookies(&mut self, cookies: Vec<Cookie>) {
        self.cookies = cookies;
    }
}

impl Sequenced for HttpRequest {
    fn sequence(&self) -> Option<u64> {
        read_sequence(self.headers())
    }
}

impl<B: Into<MessageBody>> From<Request<B>> for HttpRequest {
    fn from(request: Request<B>) -> Self {
        Self { inner: request.map(Into::into), cookies: Vec::new(), decoded_body: None }
    }
}

impl From<Parts> for HttpRequest {
    fn from(parts: Parts) -> Self {
        Self::from(Request::from_parts(parts, MessageBody::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Page {
        page: u32,
        q: String,
    }

    #[test]
    fn query_access() {
        let request = HttpRequest::get(Uri::from_static("http://example.com/search?q=rust+lang&page=2&q=again"));

        assert_eq!(request.query(), Some("q=rust+lang&page=2&q=again"));
        assert_eq!(request.query_pairs().len(), 3);
        assert_eq!(request.query_pairs()[0], ("q".to_string(), "rust lang".to_string()));

        let request = HttpRequest::get(Uri::from_static("/search?q=rust&page=2"));
        assert_eq!(request.query_as::<Page>().unwrap(), Page { page: 2, q: "rust".into() });

        assert!(HttpRequest::get(Uri::from_static("/")).query_pairs().is_empty());
    }

    #[test]
    fn create_response_echoes_sequence() {
        let mut request = HttpRequest::get(Uri::from_static("/"));
        request.set_sequence(9);

        let response = request.create_response();
        assert_eq!(response.sequence(), Some(9));
        assert_eq!(response.status(), http::StatusCode::OK);

        assert_eq!(HttpRequest::get(Uri::from_static("/")).create_response().sequence(), None);
    }

    #[test]
    fn keep_alive_rules() {
        let mut request = HttpRequest::get(Uri::from_static("/"));
        assert!(request.keep_alive());

        request.headers_mut().insert(http::header::CONNECTION, "Close".parse().unwrap());
        assert!(!request.keep_alive());

        *request.as_mut().version_mut() = Version::HTTP_10;
        request.headers_mut().insert(http::header::CONNECTION, "keep-alive".parse().unwrap());
        assert!(request.keep_alive());

        request.headers_mut().remove(http::header::CONNECTION);
        assert!(!request.keep_alive());
    }
}
