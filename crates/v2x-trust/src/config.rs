//! Testbed configuration.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;
use crate::filter::SignedRecordFilter;
use crate::pipeline::PipelinePolicy;
use crate::pki::{CertificateStore, KeyId};
use crate::scenario::Scenario;
use v2x_core::{Result, V2xError, BENIGN_RECORD};

/// Configuration shared by the querier and responder roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestbedConfig {
    /// Scenario to run (default: filtered).
    #[serde(default)]
    pub scenario: Scenario,

    /// Query multicast group (default: 225.0.0.0).
    #[serde(default = "default_group")]
    pub multicast_group: Ipv4Addr,

    /// Query multicast port (default: 2020).
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,

    /// Port answers are sent back to (default: 2021).
    #[serde(default = "default_unicast_port")]
    pub unicast_port: u16,

    /// Seconds before an unanswered round is retried.
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,

    /// Attempts per round before giving up; unbounded when absent.
    #[serde(default)]
    pub max_attempts_per_round: Option<u32>,

    /// Log progress every this many completed rounds.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Record a benign resolver answers with.
    #[serde(default = "default_expected_answer")]
    pub expected_answer: String,

    /// Certificate, key, revocation list and filter locations.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Signed-record filter sizing.
    #[serde(default)]
    pub filter: FilterConfig,
}

/// File locations, relative to `dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Authentication directory (default: Authentication).
    pub dir: PathBuf,
    /// Trusted authority certificate.
    pub ca_certificate: String,
    /// This participant's pseudonym group.
    pub group: String,
    /// This participant's pseudonym index.
    pub pseudonym: u32,
    /// Revocation list.
    pub revocation_list: String,
    /// Naming authority group (inner record signer and filter publisher).
    pub authority: String,
    /// Published signed-record filter.
    pub bloom_filter: String,
}

/// Signed-record filter sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Expected number of records, `n`.
    pub expected_elements: u64,
    /// Target false-positive rate, `p`.
    pub false_positive_rate: f64,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            multicast_group: default_group(),
            multicast_port: default_multicast_port(),
            unicast_port: default_unicast_port(),
            round_timeout_secs: default_round_timeout(),
            max_attempts_per_round: None,
            progress_every: default_progress_every(),
            expected_answer: default_expected_answer(),
            auth: AuthConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("Authentication"),
            ca_certificate: String::from("CA-certificate.crt"),
            group: String::from("OBU-A"),
            pseudonym: 0,
            revocation_list: String::from("CRL-A.crl"),
            authority: String::from("DNS"),
            bloom_filter: String::from("DNS-bloom-filter.bf"),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_elements: 1000,
            false_positive_rate: 0.01,
        }
    }
}

impl TestbedConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| V2xError::storage(path.display(), e))?;
            toml::from_str(&content).map_err(|e| V2xError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.round_timeout_secs == 0 {
            return Err(V2xError::Config("round_timeout_secs must be positive".to_string()));
        }
        if !self.multicast_group.is_multicast() {
            return Err(V2xError::Config(format!(
                "{} is not a multicast address",
                self.multicast_group
            )));
        }
        if self.max_attempts_per_round == Some(0) {
            return Err(V2xError::Config("max_attempts_per_round must be positive".to_string()));
        }
        if self.filter.expected_elements == 0 {
            return Err(V2xError::Config("filter.expected_elements must be positive".to_string()));
        }
        let rate = self.filter.false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(V2xError::Config(format!(
                "filter.false_positive_rate must be in (0, 1), got {rate}"
            )));
        }
        Ok(())
    }

    /// Multicast destination of queries.
    #[must_use]
    pub const fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }

    /// Address each round's listener binds.
    #[must_use]
    pub fn reply_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.unicast_port))
    }

    /// Round deadline.
    #[must_use]
    pub const fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    /// Pipeline policy for the configured scenario, loading the filter or
    /// naming authority certificate it needs.
    pub fn policy(&self) -> Result<PipelinePolicy> {
        Ok(match self.scenario {
            Scenario::Plain => PipelinePolicy::plain(),
            Scenario::Signed => PipelinePolicy::signed(),
            Scenario::Nested => {
                PipelinePolicy::nested(self.auth.store().get(&self.auth.authority_id())?)
            }
            Scenario::Filtered => {
                PipelinePolicy::filtered(SignedRecordFilter::load(&self.auth.bloom_filter_path())?)
            }
        })
    }

    /// Coordinator settings for `rounds` rounds.
    #[must_use]
    pub fn coordinator(&self, rounds: u64) -> CoordinatorConfig {
        CoordinatorConfig {
            target_rounds: rounds,
            round_timeout: self.round_timeout(),
            max_attempts_per_round: self.max_attempts_per_round,
            reply_addr: self.reply_addr(),
            progress_every: self.progress_every,
        }
    }
}

impl AuthConfig {
    /// Store over the authentication directory.
    #[must_use]
    pub fn store(&self) -> CertificateStore {
        CertificateStore::new(&self.dir)
    }

    /// Path of a file in the authentication directory.
    #[must_use]
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Trusted authority certificate path.
    #[must_use]
    pub fn ca_certificate_path(&self) -> PathBuf {
        self.path(&self.ca_certificate)
    }

    /// Revocation list path.
    #[must_use]
    pub fn revocation_list_path(&self) -> PathBuf {
        self.path(&self.revocation_list)
    }

    /// Published filter path.
    #[must_use]
    pub fn bloom_filter_path(&self) -> PathBuf {
        self.path(&self.bloom_filter)
    }

    /// This participant's own pseudonym.
    #[must_use]
    pub fn own_id(&self) -> KeyId {
        KeyId::pseudonym(&self.group, self.pseudonym)
    }

    /// The naming authority.
    #[must_use]
    pub fn authority_id(&self) -> KeyId {
        KeyId::single(&self.authority)
    }
}

// Default value functions for serde.
const fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(225, 0, 0, 0)
}

const fn default_multicast_port() -> u16 {
    2020
}

const fn default_unicast_port() -> u16 {
    2021
}

const fn default_round_timeout() -> u64 {
    5
}

const fn default_progress_every() -> u64 {
    25
}

fn default_expected_answer() -> String {
    String::from(BENIGN_RECORD)
}
