//! rustls client configuration

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};

use crate::config::TlsOptions;
use crate::error::{Error, Result};

/// Parse a hex fingerprint string (with or without colons) into 32 bytes.
pub(crate) fn parse_fingerprint(s: &str) -> Result<[u8; 32]> {
    let hex_str: String = s.chars().filter(|c| *c != ':' && !c.is_whitespace()).collect();
    let bytes = hex::decode(&hex_str)
        .map_err(|e| Error::Tls(format!("Invalid SSL fingerprint hex: {}", e)))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        Error::Tls(format!(
            "SSL fingerprint must be 32 bytes (SHA-256), got {} bytes",
            len
        ))
    })
}

/// How the server certificate is checked when CA verification is bypassed
#[derive(Clone, Copy)]
enum CertPolicy {
    /// SHA-256 of the leaf certificate must equal this value
    Pinned([u8; 32]),
    /// Anything goes
    AcceptAny,
}

/// Certificate verifier for pinned and accept-any modes.
/// Handshake signatures are still verified with the provider's algorithms.
struct PolicyVerifier {
    policy: CertPolicy,
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.policy {
            CertPolicy::Pinned(expected) => format!("pinned:{}", hex::encode(expected)),
            CertPolicy::AcceptAny => "accept-any".to_string(),
        };
        f.debug_struct("PolicyVerifier").field("mode", &mode).finish()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match &self.policy {
            CertPolicy::AcceptAny => Ok(ServerCertVerified::assertion()),
            CertPolicy::Pinned(expected) => {
                let actual = ring::digest::digest(&ring::digest::SHA256, end_entity.as_ref());
                if actual.as_ref() == expected.as_slice() {
                    Ok(ServerCertVerified::assertion())
                } else {
                    Err(rustls::Error::General(format!(
                        "Certificate fingerprint mismatch: expected {}, got {}",
                        hex::encode(expected),
                        hex::encode(actual.as_ref())
                    )))
                }
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the rustls `ClientConfig` for the given options.
///
/// Priority: fingerprint pinning, then accept-any, then webpki root CAs.
pub(crate) fn build_client_config(options: &TlsOptions) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let policy = match (&options.ssl_fingerprint, options.accept_invalid_certs) {
        (Some(fp), _) => Some(CertPolicy::Pinned(parse_fingerprint(fp)?)),
        (None, true) => Some(CertPolicy::AcceptAny),
        (None, false) => None,
    };

    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = match policy {
        Some(policy) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PolicyVerifier { policy, provider }))
            .with_no_client_auth(),
        None => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    Ok(config)
}
