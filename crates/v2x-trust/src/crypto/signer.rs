//! Private-key signing of payload digests.

use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING, RSA_PKCS1_SHA256};
use std::fmt;
use std::path::Path;

use super::certificate::{Certificate, SignatureScheme};
use super::hash::sha256;
use v2x_core::{Result, V2xError};

enum SigningKey {
    Ecdsa(EcdsaKeyPair),
    Rsa(RsaKeyPair),
}

/// A PKCS#8 private key that signs SHA-256 digests.
///
/// The signed message is the 32-byte digest of the payload, not the payload
/// itself, so a verifier that recomputes the digest checks the same bytes.
pub struct Signer {
    key: SigningKey,
    rng: SystemRandom,
}

impl Signer {
    /// Load an ECDSA P-256 or RSA key from PKCS#8 DER.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();
        let key = match EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng) {
            Ok(pair) => SigningKey::Ecdsa(pair),
            Err(ec_err) => match RsaKeyPair::from_pkcs8(der) {
                Ok(pair) => SigningKey::Rsa(pair),
                Err(rsa_err) => {
                    return Err(V2xError::Crypto(format!(
                        "unsupported private key (ecdsa: {ec_err}, rsa: {rsa_err})"
                    )))
                }
            },
        };
        Ok(Self { key, rng })
    }

    /// Load a private key file: PKCS#8 DER, or a PEM `PRIVATE KEY` block.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| V2xError::storage(path.display(), e))?;
        if bytes.starts_with(b"-----BEGIN") {
            let block = pem::parse(&bytes).map_err(|e| V2xError::Crypto(e.to_string()))?;
            if block.tag() != "PRIVATE KEY" {
                return Err(V2xError::Crypto(format!(
                    "expected a PKCS#8 PRIVATE KEY block in {}, found {}",
                    path.display(),
                    block.tag()
                )));
            }
            Self::from_pkcs8(block.contents())
        } else {
            Self::from_pkcs8(&bytes)
        }
    }

    /// Scheme this key produces signatures for.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        match self.key {
            SigningKey::Ecdsa(_) => SignatureScheme::EcdsaP256Sha256,
            SigningKey::Rsa(_) => SignatureScheme::RsaPkcs1Sha256,
        }
    }

    /// Sign a precomputed digest.
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            SigningKey::Ecdsa(pair) => pair
                .sign(&self.rng, digest)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| V2xError::Crypto("ecdsa signing failed".to_string())),
            SigningKey::Rsa(pair) => {
                let mut sig = vec![0u8; pair.public().modulus_len()];
                pair.sign(&RSA_PKCS1_SHA256, &self.rng, digest, &mut sig)
                    .map_err(|_| V2xError::Crypto("rsa signing failed".to_string()))?;
                Ok(sig)
            }
        }
    }

    /// Sign the SHA-256 digest of a payload, base64-encoded for a `Hash` field.
    pub fn sign_payload(&self, payload: &str) -> Result<String> {
        let signature = self.sign_digest(&sha256(payload.as_bytes()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("scheme", &self.scheme()).finish_non_exhaustive()
    }
}

/// A pseudonym: certificate plus the private key that matches it.
#[derive(Debug)]
pub struct Credentials {
    /// Certificate sent alongside every signature
    pub certificate: Certificate,
    /// Key the signatures are made with
    pub signer: Signer,
}

impl Credentials {
    /// Pair a certificate with its key.
    #[must_use]
    pub const fn new(certificate: Certificate, signer: Signer) -> Self {
        Self {
            certificate,
            signer,
        }
    }

    /// Load a certificate file and a key file.
    pub fn load(certificate: &Path, private_key: &Path) -> Result<Self> {
        Ok(Self::new(Certificate::load(certificate)?, Signer::load(private_key)?))
    }
}
