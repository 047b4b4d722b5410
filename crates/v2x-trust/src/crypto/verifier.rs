//! Signature, certificate and combined sender authentication.
//!
//! Every check here fails closed: a malformed certificate, an undecodable
//! signature or an unsupported key type all produce `false`, never an error.

use base64::Engine;
use chrono::{DateTime, Utc};
use ring::signature::UnparsedPublicKey;
use tracing::debug;
use x509_parser::time::ASN1Time;

use super::certificate::{Certificate, SignatureScheme};
use super::hash::sha256;

/// Check a signature over the SHA-256 digest of `payload`.
#[must_use]
pub fn verify_signature(payload: &[u8], signature: &[u8], certificate: &Certificate) -> bool {
    verify_digest(&sha256(payload), signature, certificate)
}

/// Check a signature against an already computed digest.
///
/// The signature must cover exactly these digest bytes.
#[must_use]
pub fn verify_digest(digest: &[u8], signature: &[u8], certificate: &Certificate) -> bool {
    let Ok(cert) = certificate.parsed() else {
        return false;
    };
    let Some(scheme) = SignatureScheme::for_certificate(&cert) else {
        debug!(subject = %cert.subject(), "unsupported public key type");
        return false;
    };
    let key_bytes: &[u8] = &cert.public_key().subject_public_key.data;
    UnparsedPublicKey::new(scheme.verification_algorithm(), key_bytes)
        .verify(digest, signature)
        .is_ok()
}

/// Verifies senders against the single trusted certificate authority.
#[derive(Debug, Clone)]
pub struct TrustVerifier {
    ca: Certificate,
}

impl TrustVerifier {
    /// Trust certificates issued by `ca`.
    #[must_use]
    pub const fn new(ca: Certificate) -> Self {
        Self { ca }
    }

    /// The trusted authority certificate.
    #[must_use]
    pub const fn authority(&self) -> &Certificate {
        &self.ca
    }

    /// True iff `certificate` is signed by the authority and valid now.
    #[must_use]
    pub fn verify_certificate(&self, certificate: &Certificate) -> bool {
        self.verify_certificate_at(certificate, Utc::now())
    }

    /// True iff `certificate` is signed by the authority and valid at `at`.
    #[must_use]
    pub fn verify_certificate_at(&self, certificate: &Certificate, at: DateTime<Utc>) -> bool {
        let (Ok(cert), Ok(ca)) = (certificate.parsed(), self.ca.parsed()) else {
            return false;
        };
        if cert.issuer() != ca.subject() {
            debug!(issuer = %cert.issuer(), "certificate not issued by the trusted authority");
            return false;
        }
        if let Err(e) = cert.verify_signature(Some(ca.public_key())) {
            debug!(subject = %cert.subject(), error = %e, "certificate signature invalid");
            return false;
        }
        let Ok(now) = ASN1Time::from_timestamp(at.timestamp()) else {
            return false;
        };
        let valid = cert.validity().is_valid_at(now);
        if !valid {
            debug!(subject = %cert.subject(), "certificate outside its validity window");
        }
        valid
    }

    /// Authenticate a sender: the certificate on the wire must decode, chain
    /// to the authority, be currently valid, and have signed `payload`.
    ///
    /// `signature` is the base64 `Hash` field, `certificate` the base64 DER
    /// `Certificate` field.
    #[must_use]
    pub fn authenticate(&self, payload: &str, signature: &str, certificate: &str) -> bool {
        self.authenticate_sender(payload, signature, certificate)
            .is_some()
    }

    /// Like [`Self::authenticate`], returning the decoded sender certificate
    /// on success.
    #[must_use]
    pub fn authenticate_sender(
        &self,
        payload: &str,
        signature: &str,
        certificate: &str,
    ) -> Option<Certificate> {
        let sender = match Certificate::from_wire(certificate) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "sender certificate undecodable");
                return None;
            }
        };
        let Ok(signature) = base64::engine::general_purpose::STANDARD.decode(signature.trim())
        else {
            debug!("signature is not base64");
            return None;
        };
        let signed = verify_signature(payload.as_bytes(), &signature, &sender);
        (signed && self.verify_certificate(&sender)).then_some(sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_pki::TestPki;
    use v2x_core::QUERY_TOKEN;

    #[test]
    fn test_authenticate_signed_query() {
        let pki = TestPki::new();
        let creds = pki.issue("OBU-A-0");
        let verifier = TrustVerifier::new(pki.ca.clone());

        let hash = creds.signer.sign_payload(QUERY_TOKEN).unwrap();
        assert!(verifier.authenticate(QUERY_TOKEN, &hash, creds.certificate.encoded()));
        assert!(!verifier.authenticate("Answer", &hash, creds.certificate.encoded()));
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let pki = TestPki::new();
        let alice = pki.issue("OBU-A-0");
        let mallory = pki.issue("OBU-X-0");
        let verifier = TrustVerifier::new(pki.ca.clone());

        let hash = mallory.signer.sign_payload(QUERY_TOKEN).unwrap();
        assert!(!verifier.authenticate(QUERY_TOKEN, &hash, alice.certificate.encoded()));
    }

    #[test]
    fn test_digest_bytes_must_match_exactly() {
        let pki = TestPki::new();
        let creds = pki.issue("OBU-A-0");
        let digest = sha256(QUERY_TOKEN.as_bytes());
        let sig = creds.signer.sign_digest(&digest).unwrap();

        assert!(verify_digest(&digest, &sig, &creds.certificate));
        assert!(verify_signature(QUERY_TOKEN.as_bytes(), &sig, &creds.certificate));

        let mut flipped = digest;
        flipped[31] ^= 0x01;
        assert!(!verify_digest(&flipped, &sig, &creds.certificate));
    }

    #[test]
    fn test_certificate_from_foreign_authority_rejected() {
        let ours = TestPki::new();
        let theirs = TestPki::new();
        let verifier = TrustVerifier::new(ours.ca.clone());
        let stranger = theirs.issue("OBU-A-0");

        assert!(!verifier.verify_certificate(&stranger.certificate));
        let hash = stranger.signer.sign_payload(QUERY_TOKEN).unwrap();
        assert!(!verifier.authenticate(QUERY_TOKEN, &hash, stranger.certificate.encoded()));
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let pki = TestPki::new();
        let expired = pki.issue_expired("OBU-A-9");
        let verifier = TrustVerifier::new(pki.ca.clone());

        assert!(!verifier.verify_certificate(&expired.certificate));
        // Inside its validity window it would have passed.
        let then = DateTime::parse_from_rfc3339("2000-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(verifier.verify_certificate_at(&expired.certificate, then));
    }

    #[test]
    fn test_malformed_inputs_fail_closed() {
        let pki = TestPki::new();
        let creds = pki.issue("OBU-A-0");
        let verifier = TrustVerifier::new(pki.ca.clone());
        let hash = creds.signer.sign_payload(QUERY_TOKEN).unwrap();

        assert!(!verifier.authenticate(QUERY_TOKEN, &hash, "not-a-certificate"));
        assert!(!verifier.authenticate(QUERY_TOKEN, "***", creds.certificate.encoded()));
        assert!(!verifier.authenticate(QUERY_TOKEN, "", creds.certificate.encoded()));
        assert!(!verify_signature(b"Query", b"", &creds.certificate));
    }
}
