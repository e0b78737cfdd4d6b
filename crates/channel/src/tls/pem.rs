//! PEM loading for certificate chains and private keys.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::TlsError;

pub fn load_certificates(path: impl AsRef<Path>) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TlsError::invalid_certificate(format!("{}: {e}", path.display())))?;
    read_certificates(&mut BufReader::new(file))
}

pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKeyDer<'static>, TlsError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TlsError::invalid_private_key(format!("{}: {e}", path.display())))?;
    read_private_key(&mut BufReader::new(file))
}

pub fn certificates_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    read_certificates(&mut &*pem)
}

pub fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    read_private_key(&mut &*pem)
}

fn read_certificates(reader: &mut dyn BufRead) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certificates = rustls_pemfile::certs(reader).collect::<Result<Vec<_>, _>>().map_err(TlsError::invalid_certificate)?;
    if certificates.is_empty() {
        return Err(TlsError::invalid_certificate("no certificate found in pem input"));
    }
    Ok(certificates)
}

fn read_private_key(reader: &mut dyn BufRead) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(reader)
        .map_err(TlsError::invalid_private_key)?
        .ok_or_else(|| TlsError::invalid_private_key("no private key found in pem input"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixture_pem() {
        let certificates = certificates_from_pem(include_bytes!("../../tests/fixtures/server.crt")).unwrap();
        assert_eq!(certificates.len(), 1);

        let key = private_key_from_pem(include_bytes!("../../tests/fixtures/server.key")).unwrap();
        assert!(matches!(key, PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(certificates_from_pem(b""), Err(TlsError::InvalidCertificate { .. })));
        assert!(matches!(private_key_from_pem(b"not pem"), Err(TlsError::InvalidPrivateKey { .. })));
    }

    #[test]
    fn loads_from_files() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
        assert_eq!(load_certificates(format!("{dir}/other.crt")).unwrap().len(), 1);
        load_private_key(format!("{dir}/other.key")).unwrap();
        assert!(load_certificates(format!("{dir}/missing.crt")).is_err());
    }
}
