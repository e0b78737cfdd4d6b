//! The request handler seam.
//!
//! Once a request is fully decoded it is passed to a [`Handler`], which produces the response
//! encoded back through the same channel. Plain async functions become handlers through
//! [`make_handler`].

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{HttpRequest, HttpResponse};

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, req: HttpRequest) -> Result<HttpResponse, Self::Error>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    type Error = H::Error;

    async fn call(&self, req: HttpRequest) -> Result<HttpResponse, Self::Error> {
        (**self).call(req).await
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> Handler for HandlerFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<HttpResponse, Err>> + Send,
{
    type Error = Err;

    async fn call(&self, req: HttpRequest) -> Result<HttpResponse, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, Err, Ret>(f: F) -> HandlerFn<F>
where
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<HttpResponse, Err>>,
    F: Fn(HttpRequest) -> Ret,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{StatusCode, Uri};

    async fn echo_path(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
        let mut response = request.create_response();
        response.set_body(request.uri().path().to_string());
        Ok(response)
    }

    async fn refuse(_request: HttpRequest) -> Result<HttpResponse, std::io::Error> {
        Err(std::io::Error::other("refused"))
    }

    #[tokio::test]
    async fn async_fn_handlers() {
        let handler = Arc::new(make_handler(echo_path));
        let response = handler.call(HttpRequest::get(Uri::from_static("http://localhost/hello"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().bytes().as_ref(), b"/hello");

        let error = make_handler(refuse).call(HttpRequest::get(Uri::from_static("/"))).await.unwrap_err();
        assert_eq!(error.to_string(), "refused");
    }
}
