//! TLS configuration for the listener and the pinned client.
//!
//! Uses rustls 0.23 with the ring provider. The server identity is either
//! loaded from PEM files or generated self-signed with rcgen; clients pin
//! the server certificate by SHA-256 fingerprint instead of relying on a
//! WebPKI root.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

/// Errors raised while building TLS material or configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
    #[error("tls configuration rejected: {0}")]
    Config(#[from] rustls::Error),
    #[error("no certificate found in {0}")]
    MissingCert(String),
    #[error("no private key found in {0}")]
    MissingKey(String),
    #[error("private key must be PKCS#8")]
    UnsupportedKey,
}

/// Server TLS identity (certificate + private key).
///
/// The private key is wrapped in `Zeroizing` so the material is erased
/// from memory when dropped.
pub struct TlsIdentity {
    /// DER-encoded certificate.
    pub cert_der: Vec<u8>,
    /// DER-encoded private key (PKCS#8), zeroized on drop.
    pub key_der: Zeroizing<Vec<u8>>,
}

/// Parameters for self-signed certificate generation.
pub struct CertParams {
    pub common_name: String,
    pub subject_alt_names: Vec<String>,
    pub validity_days: i64,
}

impl Default for CertParams {
    fn default() -> Self {
        Self {
            common_name: "accessauth".to_string(),
            subject_alt_names: vec!["localhost".to_string()],
            validity_days: 365,
        }
    }
}

/// Generate a self-signed identity (ECDSA P-256).
pub fn build_self_signed(params: &CertParams) -> Result<TlsIdentity, TlsError> {
    let key_pair = KeyPair::generate()?;

    let mut cert_params = CertificateParams::new(params.subject_alt_names.clone())?;
    cert_params
        .distinguished_name
        .push(DnType::CommonName, params.common_name.as_str());
    cert_params.not_before = OffsetDateTime::now_utc() - Duration::days(1);
    cert_params.not_after = OffsetDateTime::now_utc() + Duration::days(params.validity_days);

    let cert = cert_params.self_signed(&key_pair)?;

    Ok(TlsIdentity {
        cert_der: cert.der().to_vec(),
        key_der: Zeroizing::new(key_pair.serialize_der()),
    })
}

/// Load an identity from PEM certificate and key files.
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<TlsIdentity, TlsError> {
    let cert_der = load_certificate(cert_path)?;

    let mut key_reader = io::BufReader::new(fs::File::open(key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| TlsError::MissingKey(key_path.display().to_string()))?;
    let key_der = match key {
        PrivateKeyDer::Pkcs8(k) => Zeroizing::new(k.secret_pkcs8_der().to_vec()),
        _ => return Err(TlsError::UnsupportedKey),
    };

    Ok(TlsIdentity { cert_der, key_der })
}

/// Load the first certificate from a PEM file as DER bytes.
pub fn load_certificate(cert_path: &Path) -> Result<Vec<u8>, TlsError> {
    let mut cert_reader = io::BufReader::new(fs::File::open(cert_path)?);
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert_reader).collect::<Result<_, _>>()?;
    let cert = certs
        .into_iter()
        .next()
        .ok_or_else(|| TlsError::MissingCert(cert_path.display().to_string()))?;
    Ok(cert.as_ref().to_vec())
}

/// Build the listener-side rustls config.
pub fn server_config(identity: &TlsIdentity) -> Result<Arc<ServerConfig>, TlsError> {
    let cert = CertificateDer::from(identity.cert_der.clone());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from((*identity.key_der).clone()));

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)?;

    Ok(Arc::new(config))
}

/// Certificate verifier that pins one expected server certificate.
///
/// Compares the SHA-256 fingerprint of the presented end-entity
/// certificate against the pinned value in constant time; handshake
/// signatures are still verified with the ring provider.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    expected_fingerprint: [u8; 32],
}

impl PinnedServerVerifier {
    pub fn new(server_cert_der: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            expected_fingerprint: Sha256::digest(server_cert_der).into(),
        })
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let computed: [u8; 32] = Sha256::digest(end_entity.as_ref()).into();
        if computed.ct_eq(&self.expected_fingerprint).into() {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::BadSignature,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build a client config pinned to one server certificate.
pub fn client_config_pinned(server_cert_der: &[u8]) -> Arc<ClientConfig> {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(PinnedServerVerifier::new(server_cert_der))
        .with_no_client_auth();
    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_self_signed_identity() {
        let identity = build_self_signed(&CertParams::default()).unwrap();
        assert!(!identity.cert_der.is_empty());
        assert!(!identity.key_der.is_empty());
    }

    #[test]
    fn builds_server_config() {
        let identity = build_self_signed(&CertParams::default()).unwrap();
        assert!(server_config(&identity).is_ok());
    }

    #[test]
    fn pinned_verifier_accepts_matching_certificate() {
        let identity = build_self_signed(&CertParams::default()).unwrap();
        let verifier = PinnedServerVerifier::new(&identity.cert_der);

        let cert = CertificateDer::from(identity.cert_der.clone());
        let result = verifier.verify_server_cert(
            &cert,
            &[],
            &ServerName::try_from("localhost").unwrap(),
            &[],
            UnixTime::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn pinned_verifier_rejects_other_certificate() {
        let pinned = build_self_signed(&CertParams::default()).unwrap();
        let other = build_self_signed(&CertParams::default()).unwrap();
        let verifier = PinnedServerVerifier::new(&pinned.cert_der);

        let cert = CertificateDer::from(other.cert_der.clone());
        let result = verifier.verify_server_cert(
            &cert,
            &[],
            &ServerName::try_from("localhost").unwrap(),
            &[],
            UnixTime::now(),
        );
        assert!(result.is_err());
    }
}
