use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

use super::config::{ServerTlsConfig, rustls_versions};
use crate::TlsError;

/// Performs the server side of TLS handshakes with a shared configuration.
#[derive(Clone)]
pub struct ServerStreamBuilder {
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl ServerStreamBuilder {
    pub fn new(config: &ServerTlsConfig) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = rustls_versions(&config.protocols)?;
        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider)).with_protocol_versions(&versions)?;

        let builder = if config.requires_client_certificate() {
            let mut roots = RootCertStore::empty();
            for certificate in &config.client_roots {
                roots.add(certificate.clone()).map_err(TlsError::invalid_certificate)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build().map_err(TlsError::configuration)?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let mut server_config = builder.with_single_cert(config.certificates.clone(), config.key.clone_key())?;
        server_config.alpn_protocols.clone_from(&config.alpn_protocols);

        Ok(Self { acceptor: TlsAcceptor::from(Arc::new(server_config)), handshake_timeout: config.handshake_timeout })
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Runs the server handshake over `stream`, bounded by the handshake timeout.
    ///
    /// A failed or timed out handshake leaves nothing usable: the stream is dropped.
    pub async fn build<S>(&self, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match timeout(self.handshake_timeout, self.acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => {
                debug!(protocol = ?tls_stream.get_ref().1.protocol_version(), "server handshake complete");
                Ok(tls_stream)
            }
            Ok(Err(source)) => {
                warn!(cause = %source, "server handshake failed");
                Err(TlsError::HandshakeFailed { source })
            }
            Err(_elapsed) => {
                warn!(timeout = ?self.handshake_timeout, "server handshake timed out");
                Err(TlsError::HandshakeTimeout { timeout: self.handshake_timeout })
            }
        }
    }
}

impl fmt::Debug for ServerStreamBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStreamBuilder").field("handshake_timeout", &self.handshake_timeout).finish_non_exhaustive()
    }
}
