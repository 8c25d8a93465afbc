//! TLS for outbound uplinks.
//!
//! Three ways to trust the uplink: the system roots, a pinned SHA-256
//! fingerprint of its leaf certificate, or nothing at all. A client
//! certificate is presented when one is configured.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::WantsClientCert;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, ConfigBuilder, DigitallySignedStruct, Error as RustlsError, RootCertStore,
    SignatureScheme,
};
use tracing::{info, warn};

use crate::config::UplinkBlock;
use crate::error::UplinkError;

/// Accepts any certificate. Used when verification is off, and under a
/// fingerprint pin, which is checked after the handshake.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

/// SHA-256 of a DER certificate as colon-separated uppercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Compare a configured fingerprint with a computed one. Case and
/// separators (colon, space, dash, none) are ignored.
pub fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    let strip = |s: &str| {
        s.chars()
            .filter(|c| !matches!(c, ':' | ' ' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect::<String>()
    };
    let expected = strip(expected);
    !expected.is_empty() && expected == strip(actual)
}

fn tls_err(e: impl std::fmt::Display) -> UplinkError {
    UplinkError::Tls(e.to_string())
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "Failed to add root certificate");
        }
    }
    for e in &loaded.errors {
        warn!(error = %e, "Error loading native certificates");
    }
    roots
}

fn load_client_identity(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), UplinkError> {
    let mut reader = BufReader::new(File::open(cert_path)?);
    let chain = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(UplinkError::Tls(format!(
            "no certificates in {}",
            cert_path.display()
        )));
    }

    let mut reader = BufReader::new(File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        UplinkError::Tls(format!("no private key in {}", key_path.display()))
    })?;
    Ok((chain, key))
}

fn client_config(block: &UplinkBlock) -> Result<ClientConfig, UplinkError> {
    let builder: ConfigBuilder<ClientConfig, WantsClientCert> =
        if block.verify_cert && block.cert_fingerprint.is_none() {
            ClientConfig::builder().with_root_certificates(native_roots())
        } else {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
        };

    match (&block.client_cert, &block.client_key) {
        (Some(cert), Some(key)) => {
            let (chain, key) = load_client_identity(cert, key)?;
            builder.with_client_auth_cert(chain, key).map_err(tls_err)
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Run the TLS handshake over an open TCP connection.
pub async fn connect_tls(
    tcp: TcpStream,
    block: &UplinkBlock,
) -> Result<TlsStream<TcpStream>, UplinkError> {
    let connector = TlsConnector::from(Arc::new(client_config(block)?));
    let server_name = ServerName::try_from(block.host.clone()).map_err(tls_err)?;
    let stream = connector.connect(server_name, tcp).await.map_err(tls_err)?;

    if let Some(expected) = &block.cert_fingerprint {
        let (_, conn) = stream.get_ref();
        let actual = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| fingerprint(cert.as_ref()))
            .ok_or_else(|| UplinkError::Tls("uplink presented no certificate".into()))?;
        if !fingerprint_matches(expected, &actual) {
            return Err(UplinkError::Tls(format!(
                "certificate fingerprint mismatch: expected {expected}, got {actual}"
            )));
        }
        info!(uplink = %block.name, fingerprint = %actual, "Certificate fingerprint verified");
    }

    info!(uplink = %block.name, verify = block.verify_cert, "TLS handshake complete");
    Ok(stream)
}
