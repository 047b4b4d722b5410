//! Ordered trust decision over one response datagram.
//!
//! Stages run in a fixed order and the first failing stage decides the
//! outcome:
//!
//! 1. parse the outer envelope
//! 2. authenticate the outer signature and sender certificate
//! 3. reject senders on the revocation list
//! 4. decode the nested inner envelope
//! 5. check the inner record against the signed-record filter, or the
//!    authority's inner signature
//! 6. classify the record as benign or malicious
//!
//! A sender that passes authentication but fails stage 4 or 5 is revoked.
//! A sender that is already revoked never reaches the filter.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::crypto::{verify_signature, Certificate, TrustVerifier};
use crate::filter::SignedRecordFilter;
use crate::revocation::RevocationRegistry;
use v2x_core::{Envelope, Field, Outcome};

/// Pipeline stage at which a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Outer envelope decoding
    Parse,
    /// Outer signature and certificate chain
    AuthenticateOuter,
    /// Revocation list lookup
    CheckRevoked,
    /// Nested envelope decoding
    DecodeInner,
    /// Filter membership or inner authority signature
    CheckFilter,
    /// Benign/malicious comparison
    Classify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::AuthenticateOuter => "authenticate-outer",
            Self::CheckRevoked => "check-revoked",
            Self::DecodeInner => "decode-inner",
            Self::CheckFilter => "check-filter",
            Self::Classify => "classify",
        };
        f.write_str(s)
    }
}

/// How the inner record is vouched for.
#[derive(Debug, Clone)]
pub enum InnerCheck {
    /// The answer is the record itself; no nesting
    None,
    /// Nested record must be a member of the authority's filter
    Filter(SignedRecordFilter),
    /// Nested record must carry the authority's signature in its `Hash` field
    AuthoritySignature(Certificate),
}

/// Which stages apply to a scenario.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    /// Require and check `Certificate`/`Hash` on the outer envelope
    pub require_outer_signature: bool,
    /// Inner vouching, only consulted when the outer signature is required
    pub inner: InnerCheck,
}

impl PipelinePolicy {
    /// No authentication at all: every parseable answer is classified.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            require_outer_signature: false,
            inner: InnerCheck::None,
        }
    }

    /// Outer signature only.
    #[must_use]
    pub const fn signed() -> Self {
        Self {
            require_outer_signature: true,
            inner: InnerCheck::None,
        }
    }

    /// Outer signature plus an inner record signed by `authority`.
    #[must_use]
    pub const fn nested(authority: Certificate) -> Self {
        Self {
            require_outer_signature: true,
            inner: InnerCheck::AuthoritySignature(authority),
        }
    }

    /// Outer signature plus filter membership of the inner record.
    #[must_use]
    pub const fn filtered(filter: SignedRecordFilter) -> Self {
        Self {
            require_outer_signature: true,
            inner: InnerCheck::Filter(filter),
        }
    }
}

/// Result of running one datagram through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Terminal classification
    pub outcome: Outcome,
    /// Stage that decided it
    pub stage: Stage,
    /// Identity appended to the revocation list by this verdict
    pub revoked: Option<String>,
    /// Query dispatch time echoed in the response, epoch milliseconds
    pub dispatched_at_ms: Option<i64>,
    /// Round number echoed in the response
    pub test_number: Option<u64>,
}

impl Verdict {
    const fn new(outcome: Outcome, stage: Stage) -> Self {
        Self {
            outcome,
            stage,
            revoked: None,
            dispatched_at_ms: None,
            test_number: None,
        }
    }

    fn echoing(mut self, envelope: &Envelope) -> Self {
        self.dispatched_at_ms = envelope.dispatch_time_ms();
        self.test_number = envelope.test_number();
        self
    }
}

/// Classifies response datagrams and revokes misbehaving senders.
#[derive(Debug)]
pub struct TrustPipeline {
    verifier: TrustVerifier,
    registry: RevocationRegistry,
    policy: PipelinePolicy,
    expected_answer: String,
}

impl TrustPipeline {
    /// Assemble a pipeline. `expected_answer` is the benign record.
    pub fn new(
        verifier: TrustVerifier,
        registry: RevocationRegistry,
        policy: PipelinePolicy,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            registry,
            policy,
            expected_answer: expected_answer.into(),
        }
    }

    /// Run every applicable stage over a raw datagram.
    pub async fn process(&self, datagram: &[u8]) -> Verdict {
        let envelope = match Envelope::from_bytes(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "response envelope undecodable");
                return Verdict::new(Outcome::UntrustedMalformed, Stage::Parse);
            }
        };
        self.process_envelope(&envelope).await.echoing(&envelope)
    }

    async fn process_envelope(&self, envelope: &Envelope) -> Verdict {
        let Some(answer) = envelope.get(Field::Answer) else {
            debug!("response has no Answer field");
            return Verdict::new(Outcome::UntrustedMalformed, Stage::Parse);
        };

        if !self.policy.require_outer_signature {
            return self.classify(answer);
        }

        let sender = match (envelope.get(Field::Certificate), envelope.get(Field::Hash)) {
            (Some(certificate), Some(hash)) => {
                self.verifier.authenticate_sender(answer, hash, certificate)
            }
            _ => None,
        };
        let Some(sender) = sender else {
            return Verdict::new(Outcome::UntrustedSignature, Stage::AuthenticateOuter);
        };
        let identity = sender.encoded();

        match self.registry.contains(identity).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(sender = %sender.subject(), "sender is revoked");
                return Verdict::new(Outcome::UntrustedRevoked, Stage::CheckRevoked);
            }
            Err(e) => {
                warn!(error = %e, "revocation list unreadable, treating sender as revoked");
                return Verdict::new(Outcome::UntrustedRevoked, Stage::CheckRevoked);
            }
        }

        match &self.policy.inner {
            InnerCheck::None => self.classify(answer),
            InnerCheck::Filter(filter) => {
                let Some(inner) = decode_inner(answer, false) else {
                    return self
                        .revoke(identity, Outcome::UntrustedMalformed, Stage::DecodeInner)
                        .await;
                };
                if !filter.probably_contains(&inner.record) {
                    debug!(record = %inner.record, "inner record not in signed-record filter");
                    return self
                        .revoke(identity, Outcome::UntrustedFilterMiss, Stage::CheckFilter)
                        .await;
                }
                self.classify(&inner.record)
            }
            InnerCheck::AuthoritySignature(authority) => {
                let Some(inner) = decode_inner(answer, true) else {
                    return self
                        .revoke(identity, Outcome::UntrustedMalformed, Stage::DecodeInner)
                        .await;
                };
                let signed = inner
                    .signature
                    .is_some_and(|sig| verify_signature(inner.record.as_bytes(), &sig, authority));
                if !signed {
                    debug!(record = %inner.record, "inner record lacks authority signature");
                    return self
                        .revoke(identity, Outcome::UntrustedFilterMiss, Stage::CheckFilter)
                        .await;
                }
                self.classify(&inner.record)
            }
        }
    }

    fn classify(&self, record: &str) -> Verdict {
        let outcome = if record == self.expected_answer {
            Outcome::TrustedBenign
        } else {
            Outcome::TrustedMalicious
        };
        Verdict::new(outcome, Stage::Classify)
    }

    async fn revoke(&self, identity: &str, outcome: Outcome, stage: Stage) -> Verdict {
        let mut verdict = Verdict::new(outcome, stage);
        match self.registry.revoke(identity).await {
            Ok(()) => verdict.revoked = Some(identity.to_string()),
            Err(e) => warn!(error = %e, %stage, "failed to revoke sender"),
        }
        verdict
    }
}

struct InnerRecord {
    record: String,
    signature: Option<Vec<u8>>,
}

/// Decode the nested envelope carried in an outer `Answer`. With
/// `signed`, the inner `Hash` must be present and valid base64.
fn decode_inner(answer: &str, signed: bool) -> Option<InnerRecord> {
    use base64::Engine;

    let inner = match Envelope::from_base64(answer) {
        Ok(inner) => inner,
        Err(e) => {
            debug!(error = %e, "inner envelope undecodable");
            return None;
        }
    };
    let record = inner.get(Field::Answer)?.to_string();
    let signature = if signed {
        let hash = inner.get(Field::Hash)?;
        Some(
            base64::engine::general_purpose::STANDARD
                .decode(hash.trim())
                .ok()?,
        )
    } else {
        None
    };
    Some(InnerRecord { record, signature })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_pki::TestPki;
    use crate::crypto::Credentials;
    use v2x_core::{BENIGN_RECORD, MALICIOUS_RECORD};

    struct Fixture {
        dir: tempfile::TempDir,
        pki: TestPki,
        sender: Credentials,
        registry: RevocationRegistry,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = RevocationRegistry::new(dir.path().join("CRL-A.crl"));
        registry.reset().await.unwrap();
        let pki = TestPki::new();
        let sender = pki.issue("OBU-X-0");
        Fixture {
            dir,
            pki,
            sender,
            registry,
        }
    }

    impl Fixture {
        fn pipeline(&self, policy: PipelinePolicy) -> TrustPipeline {
            TrustPipeline::new(
                TrustVerifier::new(self.pki.ca.clone()),
                self.registry.clone(),
                policy,
                BENIGN_RECORD,
            )
        }

        fn signed_answer(&self, answer: &str) -> Vec<u8> {
            Envelope::new()
                .with(Field::Answer, answer)
                .with(Field::Certificate, self.sender.certificate.encoded())
                .with(Field::Hash, self.sender.signer.sign_payload(answer).unwrap())
                .with(Field::Time, "1700000000000")
                .with(Field::TestNumber, "4")
                .to_bytes()
                .unwrap()
        }
    }

    fn nested(record: &str) -> String {
        Envelope::new().with(Field::Answer, record).to_base64().unwrap()
    }

    fn filter_with(records: &[&str]) -> SignedRecordFilter {
        let mut filter = SignedRecordFilter::with_seed(100, 0.001, 3).unwrap();
        for r in records {
            filter.add(r);
        }
        filter
    }

    #[tokio::test]
    async fn test_plain_answers_are_classified_unauthenticated() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::plain());

        let benign = Envelope::new().with(Field::Answer, BENIGN_RECORD).to_bytes().unwrap();
        let verdict = pipeline.process(&benign).await;
        assert_eq!(verdict.outcome, Outcome::TrustedBenign);

        let forged = Envelope::new().with(Field::Answer, MALICIOUS_RECORD).to_bytes().unwrap();
        assert_eq!(pipeline.process(&forged).await.outcome, Outcome::TrustedMalicious);
    }

    #[tokio::test]
    async fn test_garbage_is_malformed_without_revocation() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::signed());

        let verdict = pipeline.process(b"\xff\xfe not cbor").await;
        assert_eq!(verdict.outcome, Outcome::UntrustedMalformed);
        assert_eq!(verdict.stage, Stage::Parse);
        assert!(f.registry.entries().await.unwrap().is_empty());

        let no_answer = Envelope::new().with(Field::Time, "1").to_bytes().unwrap();
        assert_eq!(pipeline.process(&no_answer).await.outcome, Outcome::UntrustedMalformed);
    }

    #[tokio::test]
    async fn test_signed_scenario_echoes_round_metadata() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::signed());

        let verdict = pipeline.process(&f.signed_answer(BENIGN_RECORD)).await;
        assert_eq!(verdict.outcome, Outcome::TrustedBenign);
        assert_eq!(verdict.stage, Stage::Classify);
        assert_eq!(verdict.dispatched_at_ms, Some(1_700_000_000_000));
        assert_eq!(verdict.test_number, Some(4));
    }

    #[tokio::test]
    async fn test_bad_signature_is_not_revoked() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::signed());

        let tampered = Envelope::new()
            .with(Field::Answer, MALICIOUS_RECORD)
            .with(Field::Certificate, f.sender.certificate.encoded())
            .with(Field::Hash, f.sender.signer.sign_payload(BENIGN_RECORD).unwrap())
            .to_bytes()
            .unwrap();
        let verdict = pipeline.process(&tampered).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedSignature);
        assert_eq!(verdict.stage, Stage::AuthenticateOuter);
        assert!(verdict.revoked.is_none());

        let unsigned = Envelope::new().with(Field::Answer, BENIGN_RECORD).to_bytes().unwrap();
        assert_eq!(pipeline.process(&unsigned).await.outcome, Outcome::UntrustedSignature);
        assert!(f.registry.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_miss_revokes_sender() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::filtered(filter_with(&[BENIGN_RECORD])));

        let verdict = pipeline.process(&f.signed_answer(&nested(MALICIOUS_RECORD))).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedFilterMiss);
        assert_eq!(verdict.stage, Stage::CheckFilter);
        assert_eq!(verdict.revoked.as_deref(), Some(f.sender.certificate.encoded()));
        assert!(f.registry.contains(f.sender.certificate.encoded()).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoked_sender_never_reaches_filter() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::filtered(filter_with(&[BENIGN_RECORD])));
        f.registry.revoke(f.sender.certificate.encoded()).await.unwrap();

        // Even a vouched-for benign record is rejected once revoked.
        let verdict = pipeline.process(&f.signed_answer(&nested(BENIGN_RECORD))).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedRevoked);
        assert_eq!(verdict.stage, Stage::CheckRevoked);
        assert_eq!(f.registry.occurrences(f.sender.certificate.encoded()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filter_hit_is_classified() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::filtered(filter_with(&[
            BENIGN_RECORD,
            MALICIOUS_RECORD,
        ])));

        let benign = pipeline.process(&f.signed_answer(&nested(BENIGN_RECORD))).await;
        assert_eq!(benign.outcome, Outcome::TrustedBenign);
        // Vouched for, but not the record we expected.
        let other = pipeline.process(&f.signed_answer(&nested(MALICIOUS_RECORD))).await;
        assert_eq!(other.outcome, Outcome::TrustedMalicious);
        assert!(f.registry.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_inner_revokes_sender() {
        let f = fixture().await;
        let pipeline = f.pipeline(PipelinePolicy::filtered(filter_with(&[BENIGN_RECORD])));

        // A raw record where a nested envelope belongs.
        let verdict = pipeline.process(&f.signed_answer(BENIGN_RECORD)).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedMalformed);
        assert_eq!(verdict.stage, Stage::DecodeInner);
        assert!(f.registry.contains(f.sender.certificate.encoded()).await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_authority_signature() {
        let f = fixture().await;
        let authority = f.pki.issue("DNS");
        let pipeline = f.pipeline(PipelinePolicy::nested(authority.certificate.clone()));

        let inner = Envelope::new()
            .with(Field::Answer, BENIGN_RECORD)
            .with(Field::Hash, authority.signer.sign_payload(BENIGN_RECORD).unwrap())
            .to_base64()
            .unwrap();
        let verdict = pipeline.process(&f.signed_answer(&inner)).await;
        assert_eq!(verdict.outcome, Outcome::TrustedBenign);

        // Signed by the sender itself rather than the authority.
        let forged = Envelope::new()
            .with(Field::Answer, MALICIOUS_RECORD)
            .with(Field::Hash, f.sender.signer.sign_payload(MALICIOUS_RECORD).unwrap())
            .to_base64()
            .unwrap();
        let verdict = pipeline.process(&f.signed_answer(&forged)).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedFilterMiss);
        assert!(verdict.revoked.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_registry_fails_closed() {
        let f = fixture().await;
        let pipeline = TrustPipeline::new(
            TrustVerifier::new(f.pki.ca.clone()),
            RevocationRegistry::new(f.dir.path().join("missing").join("CRL.crl")),
            PipelinePolicy::signed(),
            BENIGN_RECORD,
        );
        let verdict = pipeline.process(&f.signed_answer(BENIGN_RECORD)).await;
        assert_eq!(verdict.outcome, Outcome::UntrustedRevoked);
    }
}
