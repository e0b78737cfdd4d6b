use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use super::pem;
use super::verifier::{CertificateValidator, default_certificate_policy};
use crate::TlsError;

/// Default bound on a TLS handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TlsVersion {
    #[default]
    Tls12,
    Tls13,
}

impl TlsVersion {
    pub fn to_rustls(self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            Self::Tls12 => &rustls::version::TLS12,
            Self::Tls13 => &rustls::version::TLS13,
        }
    }
}

pub(crate) fn rustls_versions(protocols: &[TlsVersion]) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, TlsError> {
    if protocols.is_empty() {
        return Err(TlsError::configuration("at least one protocol version must be allowed"));
    }
    let mut versions: Vec<_> = protocols.to_vec();
    versions.sort_unstable();
    versions.dedup();
    Ok(versions.into_iter().map(TlsVersion::to_rustls).collect())
}

/// A certificate chain plus the key it was issued for.
///
/// The key sits behind an `Arc` because `PrivateKeyDer` is not `Clone`.
#[derive(Clone)]
pub struct ClientAuth {
    pub certificates: Vec<CertificateDer<'static>>,
    pub key: Arc<PrivateKeyDer<'static>>,
}

impl ClientAuth {
    pub fn new(certificates: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { certificates, key: Arc::new(key) }
    }

    /// Loads the chain and key from PEM files.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, TlsError> {
        Ok(Self::new(pem::load_certificates(cert_path)?, pem::load_private_key(key_path)?))
    }
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuth").field("certificates", &self.certificates.len()).finish_non_exhaustive()
    }
}

/// Server side TLS termination settings.
#[derive(Clone)]
pub struct ServerTlsConfig {
    pub certificates: Vec<CertificateDer<'static>>,
    pub key: Arc<PrivateKeyDer<'static>>,
    /// Allowed protocol versions, TLS 1.2 only by default.
    pub protocols: Vec<TlsVersion>,
    pub handshake_timeout: Duration,
    /// Trust roots for client certificates. A non empty list makes a client certificate mandatory.
    pub client_roots: Vec<CertificateDer<'static>>,
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl ServerTlsConfig {
    pub fn new(certificates: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self {
            certificates,
            key: Arc::new(key),
            protocols: vec![TlsVersion::Tls12],
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            client_roots: Vec::new(),
            alpn_protocols: Vec::new(),
        }
    }

    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, TlsError> {
        Ok(Self::new(pem::load_certificates(cert_path)?, pem::load_private_key(key_path)?))
    }

    #[must_use]
    pub fn protocols(mut self, protocols: Vec<TlsVersion>) -> Self {
        self.protocols = protocols;
        self
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Requires clients to present a certificate issued by one of `roots`.
    #[must_use]
    pub fn require_client_certificate(mut self, roots: Vec<CertificateDer<'static>>) -> Self {
        self.client_roots = roots;
        self
    }

    #[must_use]
    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    pub fn requires_client_certificate(&self) -> bool {
        !self.client_roots.is_empty()
    }
}

impl fmt::Debug for ServerTlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTlsConfig")
            .field("certificates", &self.certificates.len())
            .field("protocols", &self.protocols)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("client_roots", &self.client_roots.len())
            .finish_non_exhaustive()
    }
}

/// Client side TLS settings.
#[derive(Clone)]
pub struct ClientTlsConfig {
    /// Host name sent in SNI and handed to the validator.
    pub server_name: String,
    pub client_auth: Option<ClientAuth>,
    /// The certificate the server is expected to present, if pinned.
    pub expected_certificate: Option<CertificateDer<'static>>,
    pub protocols: Vec<TlsVersion>,
    pub handshake_timeout: Duration,
    pub validator: CertificateValidator,
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl ClientTlsConfig {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            client_auth: None,
            expected_certificate: None,
            protocols: vec![TlsVersion::Tls12],
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            validator: Arc::new(default_certificate_policy),
            alpn_protocols: Vec::new(),
        }
    }

    #[must_use]
    pub fn client_auth(mut self, client_auth: ClientAuth) -> Self {
        self.client_auth = Some(client_auth);
        self
    }

    #[must_use]
    pub fn expected_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.expected_certificate = Some(certificate);
        self
    }

    #[must_use]
    pub fn protocols(mut self, protocols: Vec<TlsVersion>) -> Self {
        self.protocols = protocols;
        self
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replaces the default trust decision with `validator`.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(Option<&CertificateDer<'_>>, Option<&CertificateDer<'_>>) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    #[must_use]
    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }
}

impl fmt::Debug for ClientTlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTlsConfig")
            .field("server_name", &self.server_name)
            .field("client_auth", &self.client_auth)
            .field("pinned", &self.expected_certificate.is_some())
            .field("protocols", &self.protocols)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}
