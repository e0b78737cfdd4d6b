use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tracing::{debug, warn};

/// Decides whether a server certificate is trusted.
///
/// Called with the expected certificate (if one is pinned) and the certificate the
/// server presented. Handshake signatures are verified independently of this decision.
pub type CertificateValidator = Arc<dyn Fn(Option<&CertificateDer<'_>>, Option<&CertificateDer<'_>>) -> bool + Send + Sync>;

/// Accepts when exactly one side is absent, or when both are present and byte identical.
pub fn default_certificate_policy(expected: Option<&CertificateDer<'_>>, presented: Option<&CertificateDer<'_>>) -> bool {
    match (expected, presented) {
        (Some(expected), Some(presented)) => expected.as_ref() == presented.as_ref(),
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => false,
    }
}

/// Routes the trust decision of a client handshake through a [`CertificateValidator`].
pub(crate) struct PolicyServerCertVerifier {
    expected: Option<CertificateDer<'static>>,
    validator: CertificateValidator,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PolicyServerCertVerifier {
    pub(crate) fn new(expected: Option<CertificateDer<'static>>, validator: CertificateValidator, algorithms: WebPkiSupportedAlgorithms) -> Self {
        Self { expected, validator, algorithms }
    }
}

impl fmt::Debug for PolicyServerCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyServerCertVerifier").field("pinned", &self.expected.is_some()).finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if (self.validator)(self.expected.as_ref(), Some(end_entity)) {
            debug!(server = ?server_name, "server certificate accepted");
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(server = ?server_name, pinned = self.expected.is_some(), "server certificate rejected");
            Err(rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure))
        }
    }

    fn verify_tls12_signature(&self, message: &[u8], cert: &CertificateDer<'_>, dss: &DigitallySignedStruct) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(&self, message: &[u8], cert: &CertificateDer<'_>, dss: &DigitallySignedStruct) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let a = CertificateDer::from(vec![1u8, 2, 3]);
        let b = CertificateDer::from(vec![1u8, 2, 4]);

        assert!(default_certificate_policy(None, Some(&a)));
        assert!(default_certificate_policy(Some(&a), None));
        assert!(!default_certificate_policy(None, None));
        assert!(default_certificate_policy(Some(&a), Some(&a.clone())));
        assert!(!default_certificate_policy(Some(&a), Some(&b)));
    }
}
