//! TLS termination and origination over any async byte stream.
//!
//! [`ServerStreamBuilder`] and [`ClientStreamBuilder`] run the handshake over a raw stream
//! and hand back a `tokio_rustls` stream, which channels wrap in
//! [`MaybeTlsStream`](crate::channel::MaybeTlsStream). Both bound the handshake with a
//! timeout. A failed handshake is always an error: there is no fallback to plaintext.

mod client;
mod config;
mod pem;
mod server;
mod verifier;

pub use client::ClientStreamBuilder;
pub use config::{ClientAuth, ClientTlsConfig, DEFAULT_HANDSHAKE_TIMEOUT, ServerTlsConfig, TlsVersion};
pub use pem::{certificates_from_pem, load_certificates, load_private_key, private_key_from_pem};
pub use server::ServerStreamBuilder;
pub use verifier::{CertificateValidator, default_certificate_policy};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TlsError;
    use crate::channel::MaybeTlsStream;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    const SERVER_CRT: &[u8] = include_bytes!("../../tests/fixtures/server.crt");
    const SERVER_KEY: &[u8] = include_bytes!("../../tests/fixtures/server.key");
    const OTHER_CRT: &[u8] = include_bytes!("../../tests/fixtures/other.crt");

    fn server_builder() -> ServerStreamBuilder {
        let config = ServerTlsConfig::new(certificates_from_pem(SERVER_CRT).unwrap(), private_key_from_pem(SERVER_KEY).unwrap());
        ServerStreamBuilder::new(&config).unwrap()
    }

    fn pinned_client(pem: &[u8]) -> ClientStreamBuilder {
        let pinned = certificates_from_pem(pem).unwrap().remove(0);
        ClientStreamBuilder::new(&ClientTlsConfig::new("localhost").expected_certificate(pinned)).unwrap()
    }

    #[tokio::test]
    async fn handshake_with_pinned_certificate() {
        let (client_io, server_io) = duplex(16 * 1024);
        let server = server_builder();
        let client = pinned_client(SERVER_CRT);

        let (server_stream, client_stream) = tokio::join!(server.build(server_io), client.build(client_io));
        let mut server_stream = MaybeTlsStream::from(server_stream.unwrap());
        let mut client_stream = MaybeTlsStream::from(client_stream.unwrap());

        assert!(client_stream.is_tls());
        assert_eq!(client_stream.peer_certificates().map(<[_]>::len), Some(1));

        client_stream.write_all(b"ping").await.unwrap();
        client_stream.flush().await.unwrap();

        let mut received = [0u8; 4];
        server_stream.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"ping");
    }

    #[tokio::test]
    async fn mismatched_pin_is_rejected() {
        let (client_io, server_io) = duplex(16 * 1024);
        let server = server_builder();
        let client = pinned_client(OTHER_CRT);

        let (server_stream, client_stream) = tokio::join!(server.build(server_io), client.build(client_io));

        assert!(matches!(client_stream, Err(TlsError::CertificateRejected { .. })));
        assert!(matches!(server_stream, Err(TlsError::HandshakeFailed { .. })));
    }

    #[tokio::test]
    async fn custom_validator_decides_trust() {
        let (client_io, server_io) = duplex(16 * 1024);
        let server = server_builder();
        let config = ClientTlsConfig::new("localhost").validator(|_expected, _presented| false);
        let client = ClientStreamBuilder::new(&config).unwrap();

        let (_, client_stream) = tokio::join!(server.build(server_io), client.build(client_io));
        assert!(matches!(client_stream, Err(TlsError::CertificateRejected { .. })));
    }

    #[tokio::test]
    async fn server_handshake_times_out() {
        let (_client_io, server_io) = duplex(1024);
        let config = ServerTlsConfig::new(certificates_from_pem(SERVER_CRT).unwrap(), private_key_from_pem(SERVER_KEY).unwrap())
            .handshake_timeout(Duration::from_millis(50));
        let server = ServerStreamBuilder::new(&config).unwrap();

        let result = server.build(server_io).await;
        assert!(matches!(result, Err(TlsError::HandshakeTimeout { .. })));
    }

    #[test]
    fn rejects_bad_configuration() {
        let config = ServerTlsConfig::new(certificates_from_pem(SERVER_CRT).unwrap(), private_key_from_pem(SERVER_KEY).unwrap()).protocols(vec![]);
        assert!(matches!(ServerStreamBuilder::new(&config), Err(TlsError::Configuration { .. })));

        assert!(matches!(ClientStreamBuilder::new(&ClientTlsConfig::new("")), Err(TlsError::InvalidServerName { .. })));
    }
}
