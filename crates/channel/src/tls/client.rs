use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use super::config::{ClientTlsConfig, rustls_versions};
use super::verifier::PolicyServerCertVerifier;
use crate::TlsError;

/// Performs the client side of TLS handshakes with a shared configuration.
#[derive(Clone)]
pub struct ClientStreamBuilder {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    handshake_timeout: Duration,
}

impl ClientStreamBuilder {
    pub fn new(config: &ClientTlsConfig) -> Result<Self, TlsError> {
        let server_name = ServerName::try_from(config.server_name.clone())
            .map_err(|_invalid| TlsError::InvalidServerName { name: config.server_name.clone() })?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = PolicyServerCertVerifier::new(
            config.expected_certificate.clone(),
            Arc::clone(&config.validator),
            provider.signature_verification_algorithms,
        );

        let versions = rustls_versions(&config.protocols)?;
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier));

        let mut client_config = match &config.client_auth {
            Some(client_auth) => builder.with_client_auth_cert(client_auth.certificates.clone(), client_auth.key.clone_key())?,
            None => builder.with_no_client_auth(),
        };
        client_config.alpn_protocols.clone_from(&config.alpn_protocols);

        Ok(Self { connector: TlsConnector::from(Arc::new(client_config)), server_name, handshake_timeout: config.handshake_timeout })
    }

    /// Runs the client handshake over `stream`, bounded by the handshake timeout.
    pub async fn build<S>(&self, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match timeout(self.handshake_timeout, self.connector.connect(self.server_name.clone(), stream)).await {
            Ok(Ok(tls_stream)) => {
                debug!(server = ?self.server_name, "client handshake complete");
                Ok(tls_stream)
            }
            Ok(Err(source)) => {
                warn!(server = ?self.server_name, cause = %source, "client handshake failed");
                Err(classify_failure(source))
            }
            Err(_elapsed) => Err(TlsError::HandshakeTimeout { timeout: self.handshake_timeout }),
        }
    }
}

/// Surfaces a rejected server certificate as its own error kind.
fn classify_failure(source: io::Error) -> TlsError {
    match source.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        Some(rustls::Error::InvalidCertificate(reason)) => TlsError::CertificateRejected { reason: format!("{reason:?}") },
        _ => TlsError::HandshakeFailed { source },
    }
}

impl fmt::Debug for ClientStreamBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStreamBuilder")
            .field("server_name", &self.server_name)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}
