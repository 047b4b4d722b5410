//! Answering participant.
//!
//! Listens on the query multicast group and answers every acceptable query
//! directly to the querier. The answer shape follows the scenario; the
//! record it carries is configurable, so the same responder plays either a
//! benign resolver or a compromised vehicle. Signed answers rotate through a
//! pool of pseudonym certificates.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::crypto::{Credentials, Signer, TrustVerifier};
use crate::scenario::Scenario;
use v2x_core::{Envelope, Field, Result, V2xError, MAX_DATAGRAM, QUERY_TOKEN};

/// Responder settings.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Answer shape
    pub scenario: Scenario,
    /// Record placed in every answer
    pub answer: String,
    /// Answers sent under one pseudonym before switching to the next
    pub rotate_every: u64,
    /// Port on the querier that answers are sent to
    pub reply_port: u16,
}

/// Builds and sends answers.
#[derive(Debug)]
pub struct Responder {
    config: ResponderConfig,
    pseudonyms: Vec<Credentials>,
    verifier: Option<TrustVerifier>,
    authority: Option<Signer>,
    answered: u64,
}

impl Responder {
    /// Assemble a responder.
    ///
    /// Signed scenarios need at least one pseudonym. The nested scenario
    /// needs the authority key that signs inner records. With a
    /// `verifier`, signed queries must authenticate before they are answered.
    pub fn new(
        config: ResponderConfig,
        pseudonyms: Vec<Credentials>,
        verifier: Option<TrustVerifier>,
        authority: Option<Signer>,
    ) -> Result<Self> {
        if config.scenario.is_signed() && pseudonyms.is_empty() {
            return Err(V2xError::Config(format!(
                "scenario {} needs at least one pseudonym",
                config.scenario
            )));
        }
        if config.scenario == Scenario::Nested && authority.is_none() {
            return Err(V2xError::Config(
                "nested scenario needs the authority signing key".to_string(),
            ));
        }
        if config.rotate_every == 0 {
            return Err(V2xError::Config("rotate_every must be positive".to_string()));
        }
        Ok(Self {
            config,
            pseudonyms,
            verifier,
            authority,
            answered: 0,
        })
    }

    /// Index of the pseudonym the next answer is signed with.
    ///
    /// Advances every `rotate_every` answers and stays on the last pseudonym
    /// once the pool is used up.
    #[must_use]
    pub fn current_pseudonym(&self) -> usize {
        let step = usize::try_from(self.answered / self.config.rotate_every).unwrap_or(usize::MAX);
        step.min(self.pseudonyms.len().saturating_sub(1))
    }

    /// Answers built so far.
    #[must_use]
    pub const fn answered(&self) -> u64 {
        self.answered
    }

    /// Whether a query deserves an answer.
    #[must_use]
    pub fn accepts(&self, query: &Envelope) -> bool {
        if query.get(Field::Query) != Some(QUERY_TOKEN) {
            return false;
        }
        if !self.config.scenario.is_signed() {
            return true;
        }
        let Some(verifier) = &self.verifier else {
            return true;
        };
        match (query.get(Field::Certificate), query.get(Field::Hash)) {
            (Some(cert), Some(hash)) => verifier.authenticate(QUERY_TOKEN, hash, cert),
            _ => false,
        }
    }

    /// Build the answer to `query`, echoing its `Time` and `TestNumber`.
    pub fn answer(&mut self, query: &Envelope) -> Result<Envelope> {
        let record = self.config.answer.as_str();
        let payload = match self.config.scenario {
            Scenario::Plain | Scenario::Signed => record.to_string(),
            Scenario::Nested => {
                let authority = self.authority.as_ref().ok_or_else(|| {
                    V2xError::Config("nested scenario needs the authority signing key".to_string())
                })?;
                Envelope::new()
                    .with(Field::Answer, record)
                    .with(Field::Hash, authority.sign_payload(record)?)
                    .to_base64()?
            }
            Scenario::Filtered => Envelope::new().with(Field::Answer, record).to_base64()?,
        };

        let mut answer = Envelope::new().with(Field::Answer, payload.as_str());
        for field in [Field::Time, Field::TestNumber] {
            if let Some(value) = query.get(field) {
                answer.insert(field, value);
            }
        }

        if self.config.scenario.is_signed() {
            let before = self.current_pseudonym();
            let creds = &self.pseudonyms[before];
            answer.insert(Field::Certificate, creds.certificate.encoded());
            answer.insert(Field::Hash, creds.signer.sign_payload(&payload)?);
            self.answered += 1;
            let after = self.current_pseudonym();
            if after != before {
                info!(from = before, to = after, "switching pseudonym");
            } else if self.answered % self.config.rotate_every == 0 {
                debug!(pseudonym = after, "pseudonym pool exhausted, keeping last");
            }
        } else {
            self.answered += 1;
        }
        Ok(answer)
    }

    /// Join `group` and answer queries until the socket fails.
    pub async fn serve(mut self, group: SocketAddrV4) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, group.port())).await?;
        socket.join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)?;
        info!(
            group = %group,
            scenario = %self.config.scenario,
            pseudonyms = self.pseudonyms.len(),
            "responder listening"
        );

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let query = match Envelope::from_bytes(&buf[..len]) {
                Ok(q) => q,
                Err(e) => {
                    debug!(%peer, error = %e, "ignoring undecodable query");
                    continue;
                }
            };
            if !self.accepts(&query) {
                debug!(%peer, "query rejected");
                continue;
            }
            let answer = match self.answer(&query).and_then(|a| a.to_bytes()) {
                Ok(a) => a,
                Err(e) => {
                    warn!(%peer, error = %e, "failed to build answer");
                    continue;
                }
            };
            let reply_to = SocketAddr::new(peer.ip(), self.config.reply_port);
            if let Err(e) = socket.send_to(&answer, reply_to).await {
                warn!(%reply_to, error = %e, "failed to send answer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_pki::TestPki;
    use crate::crypto::Certificate;
    use v2x_core::{BENIGN_RECORD, MALICIOUS_RECORD};

    fn config(scenario: Scenario, rotate_every: u64) -> ResponderConfig {
        ResponderConfig {
            scenario,
            answer: MALICIOUS_RECORD.to_string(),
            rotate_every,
            reply_port: 2021,
        }
    }

    fn query() -> Envelope {
        Envelope::new()
            .with(Field::Query, QUERY_TOKEN)
            .with(Field::Time, "1700000000000")
            .with(Field::TestNumber, "3")
    }

    #[test]
    fn test_signed_scenarios_require_pseudonyms() {
        assert!(Responder::new(config(Scenario::Signed, 1), vec![], None, None).is_err());
        assert!(Responder::new(config(Scenario::Plain, 1), vec![], None, None).is_ok());
        let pki = TestPki::new();
        assert!(
            Responder::new(config(Scenario::Nested, 1), vec![pki.issue("OBU-X-0")], None, None)
                .is_err()
        );
    }

    #[test]
    fn test_plain_answer_echoes_round_fields() {
        let mut responder = Responder::new(config(Scenario::Plain, 1), vec![], None, None).unwrap();
        let answer = responder.answer(&query()).unwrap();
        assert_eq!(answer.get(Field::Answer), Some(MALICIOUS_RECORD));
        assert_eq!(answer.test_number(), Some(3));
        assert_eq!(answer.dispatch_time_ms(), Some(1_700_000_000_000));
        assert_eq!(answer.get(Field::Certificate), None);
    }

    #[test]
    fn test_pseudonyms_rotate_then_stick_to_last() {
        let pki = TestPki::new();
        let pool: Vec<Credentials> = (0..3).map(|i| pki.issue(&format!("OBU-X-{i}"))).collect();
        let identities: Vec<String> = pool.iter().map(|c| c.certificate.encoded().to_string()).collect();
        let mut responder = Responder::new(config(Scenario::Signed, 2), pool, None, None).unwrap();

        let used: Vec<String> = (0..8)
            .map(|_| {
                responder
                    .answer(&query())
                    .unwrap()
                    .require(Field::Certificate)
                    .unwrap()
                    .to_string()
            })
            .collect();
        let expected_index = [0, 0, 1, 1, 2, 2, 2, 2];
        for (cert, idx) in used.iter().zip(expected_index) {
            assert_eq!(cert, &identities[idx]);
        }
        assert_eq!(responder.answered(), 8);
    }

    #[test]
    fn test_signed_answer_authenticates() {
        let pki = TestPki::new();
        let verifier = TrustVerifier::new(pki.ca.clone());
        let mut responder =
            Responder::new(config(Scenario::Filtered, 5), vec![pki.issue("OBU-X-0")], None, None)
                .unwrap();

        let answer = responder.answer(&query()).unwrap();
        let payload = answer.require(Field::Answer).unwrap();
        assert!(verifier.authenticate(
            payload,
            answer.require(Field::Hash).unwrap(),
            answer.require(Field::Certificate).unwrap()
        ));
        let inner = Envelope::from_base64(payload).unwrap();
        assert_eq!(inner.get(Field::Answer), Some(MALICIOUS_RECORD));
        assert_eq!(inner.get(Field::Hash), None);
    }

    #[test]
    fn test_nested_inner_carries_authority_signature() {
        let pki = TestPki::new();
        let authority = pki.issue("DNS");
        let authority_cert: Certificate = authority.certificate.clone();
        let mut cfg = config(Scenario::Nested, 5);
        cfg.answer = BENIGN_RECORD.to_string();
        let mut responder =
            Responder::new(cfg, vec![pki.issue("OBU-A-0")], None, Some(authority.signer)).unwrap();

        let answer = responder.answer(&query()).unwrap();
        let inner = Envelope::from_base64(answer.require(Field::Answer).unwrap()).unwrap();
        let sig = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            inner.require(Field::Hash).unwrap(),
        )
        .unwrap();
        assert!(crate::crypto::verify_signature(
            BENIGN_RECORD.as_bytes(),
            &sig,
            &authority_cert
        ));
    }

    #[test]
    fn test_query_acceptance() {
        let pki = TestPki::new();
        let querier = pki.issue("OBU-A-0");
        let responder = Responder::new(
            config(Scenario::Signed, 1),
            vec![pki.issue("OBU-X-0")],
            Some(TrustVerifier::new(pki.ca.clone())),
            None,
        )
        .unwrap();

        assert!(!responder.accepts(&query()));
        let signed = query()
            .with(Field::Certificate, querier.certificate.encoded())
            .with(Field::Hash, querier.signer.sign_payload(QUERY_TOKEN).unwrap());
        assert!(responder.accepts(&signed));
        assert!(!responder.accepts(&Envelope::new().with(Field::Query, "Other")));
    }
}
