//! X.509 certificates as they travel in envelopes and sit on disk.

use base64::Engine;
use std::fmt;
use std::path::Path;
use x509_parser::certificate::X509Certificate;
use x509_parser::public_key::PublicKey;

use super::hash::sha256_hex;
use v2x_core::{Result, V2xError};

/// Public-key signature schemes the testbed can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// ECDSA over P-256 with SHA-256, ASN.1 DER signatures
    EcdsaP256Sha256,
    /// RSA PKCS#1 v1.5 with SHA-256
    RsaPkcs1Sha256,
}

impl SignatureScheme {
    /// Scheme implied by a certificate's subject public key, if supported.
    pub(crate) fn for_certificate(cert: &X509Certificate<'_>) -> Option<Self> {
        match cert.public_key().parsed() {
            Ok(PublicKey::RSA(_)) => Some(Self::RsaPkcs1Sha256),
            Ok(PublicKey::EC(point)) if point.key_size() == 256 => Some(Self::EcdsaP256Sha256),
            _ => None,
        }
    }

    pub(crate) fn verification_algorithm(
        self,
    ) -> &'static dyn ring::signature::VerificationAlgorithm {
        match self {
            Self::EcdsaP256Sha256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
            Self::RsaPkcs1Sha256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EcdsaP256Sha256 => f.write_str("ecdsa-p256-sha256"),
            Self::RsaPkcs1Sha256 => f.write_str("rsa-pkcs1-sha256"),
        }
    }
}

/// A parsed-once, immutable X.509 certificate.
///
/// The wire form is base64 of the DER bytes. It is recomputed from the DER
/// on construction, so the same certificate always has the same wire form
/// and can be used as its revocation identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    encoded: String,
}

impl Certificate {
    /// Wrap DER bytes, rejecting anything that is not a parseable certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        x509_parser::parse_x509_certificate(&der)
            .map_err(|e| V2xError::Certificate(e.to_string()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&der);
        Ok(Self { der, encoded })
    }

    /// Decode the base64 DER carried in a `Certificate` field.
    pub fn from_wire(encoded: &str) -> Result<Self> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| V2xError::Certificate(format!("base64 decode failed: {e}")))?;
        Self::from_der(der)
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(text: &[u8]) -> Result<Self> {
        let pems = pem::parse_many(text).map_err(|e| V2xError::Certificate(e.to_string()))?;
        let block = pems
            .into_iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| V2xError::Certificate("no CERTIFICATE block in PEM".to_string()))?;
        Self::from_der(block.into_contents())
    }

    /// Load a certificate file, PEM or raw DER.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| V2xError::storage(path.display(), e))?;
        if bytes.starts_with(b"-----BEGIN") {
            Self::from_pem(&bytes)
        } else {
            Self::from_der(bytes)
        }
    }

    /// Raw DER bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 DER, as placed in envelopes and recorded in the revocation list.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// SHA-256 fingerprint of the DER bytes, lowercase hex.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.der)
    }

    /// Subject distinguished name, for logs.
    #[must_use]
    pub fn subject(&self) -> String {
        self.parsed()
            .map(|c| c.subject().to_string())
            .unwrap_or_default()
    }

    /// Signature scheme implied by the subject public key.
    #[must_use]
    pub fn scheme(&self) -> Option<SignatureScheme> {
        self.parsed()
            .ok()
            .and_then(|c| SignatureScheme::for_certificate(&c))
    }

    pub(crate) fn parsed(&self) -> Result<X509Certificate<'_>> {
        let (_, cert) = x509_parser::parse_x509_certificate(&self.der)
            .map_err(|e| V2xError::Certificate(e.to_string()))?;
        Ok(cert)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
