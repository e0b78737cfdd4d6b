//! Echoes every request body back, with the request path and cookies logged.
//!
//! ```text
//! cargo run --example echo_server
//! cargo run --example echo_server -- server.crt server.key   # with tls
//! ```

use std::error::Error;

use micro_channel_http::form::CompositeDeserializer;
use micro_channel_http::handler::make_handler;
use micro_channel_http::protocol::{Cookie, HttpRequest, HttpResponse};
use micro_channel_http::server::HttpServer;
use micro_channel::tls::ServerTlsConfig;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut builder = HttpServer::builder().address("127.0.0.1:8080").pipelining(16).deserializer(CompositeDeserializer::default());

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [cert, key] = args.as_slice() {
        match ServerTlsConfig::from_pem_files(cert, key) {
            Ok(tls) => builder = builder.tls(tls),
            Err(e) => {
                error!(cause = %e, "can't load tls certificate");
                return;
            }
        }
    }

    let server = match builder.build() {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "invalid server configuration");
            return;
        }
    };

    if let Err(e) = server.start(make_handler(echo)).await {
        error!(cause = %e, "server stopped");
    }
}

async fn echo(request: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
    let cookies: Vec<&str> = request.cookies().iter().map(|cookie| cookie.name.as_str()).collect();
    info!(method = %request.method(), uri = %request.uri(), ?cookies, body_size = request.body().len(), "receiving request");

    if let Some(form) = request.decoded_body() {
        info!(params = ?form.params, files = form.files.len(), "decoded form body");
    }

    let mut response = request.create_response();
    response.set_body(request.body().bytes().clone());
    response.add_cookie(Cookie::new("visited", "1").path("/"));
    Ok(response)
}
