//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::output::OutputFormat;
use v2x_core::{BENIGN_RECORD, MALICIOUS_RECORD};
use v2x_trust::Scenario;

/// V2X trust-verification testbed
///
/// Measures how signatures, revocation lists and signed-record filters hold
/// up against compromised participants answering address queries.
#[derive(Parser, Debug)]
#[command(name = "v2x")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Testbed configuration file (TOML); defaults apply if it does not exist
    #[arg(short, long, env = "V2X_CONFIG", global = true, default_value = "v2x.toml")]
    pub config: PathBuf,

    /// Log filter, e.g. `info` or `v2x_trust=debug`
    #[arg(long, env = "RUST_LOG", global = true, default_value = "info")]
    pub log_level: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run query/response rounds and classify every answer
    Query(QueryArgs),

    /// Answer queries as a benign or compromised participant
    Respond(RespondArgs),

    /// Create the pseudonym authority and issue certificates
    Pki(PkiArgs),

    /// Publish or inspect a signed-record filter
    Filter(FilterArgs),
}

/// Scenario selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    /// 1: unsigned queries and answers
    Plain,
    /// 2: signed queries and answers
    Signed,
    /// 3: answers wrap an authority-signed record
    Nested,
    /// 4: answers wrap a record checked against the authority's filter
    Filtered,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Plain => Self::Plain,
            ScenarioArg::Signed => Self::Signed,
            ScenarioArg::Nested => Self::Nested,
            ScenarioArg::Filtered => Self::Filtered,
        }
    }
}

// ============================================================================
// Query command
// ============================================================================

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Rounds to complete
    #[arg(short = 'n', long, default_value = "1000")]
    pub rounds: u64,

    /// Scenario (overrides config)
    #[arg(short, long, value_enum)]
    pub scenario: Option<ScenarioArg>,

    /// Seconds before an unanswered round is retried (overrides config)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Give up after this many attempts at one round (overrides config)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Keep the existing revocation list instead of resetting it
    #[arg(long)]
    pub keep_revocations: bool,

    /// Certificate files to revoke before the first round
    #[arg(long = "revoke", value_name = "CERT")]
    pub revoke: Vec<PathBuf>,
}

// ============================================================================
// Respond command
// ============================================================================

/// Which fixed record to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AnswerKind {
    /// The resolver's genuine record
    Benign,
    /// A forged record
    #[default]
    Malicious,
}

impl AnswerKind {
    /// The record text.
    #[must_use]
    pub const fn record(self) -> &'static str {
        match self {
            Self::Benign => BENIGN_RECORD,
            Self::Malicious => MALICIOUS_RECORD,
        }
    }
}

#[derive(Args, Debug)]
pub struct RespondArgs {
    /// Scenario (overrides config)
    #[arg(short, long, value_enum)]
    pub scenario: Option<ScenarioArg>,

    /// Answer with the benign or the forged record
    #[arg(short, long, value_enum, default_value_t)]
    pub answer: AnswerKind,

    /// Answer with this record instead
    #[arg(long, conflicts_with = "answer")]
    pub record: Option<String>,

    /// Pseudonym group to sign answers with
    #[arg(short, long, default_value = "OBU-X")]
    pub group: String,

    /// Pseudonyms to load from the group
    #[arg(short, long, default_value = "1")]
    pub pseudonyms: u32,

    /// Answers per pseudonym before switching to the next
    #[arg(short, long, default_value = "100")]
    pub rate: u64,

    /// Answer signed queries without authenticating them
    #[arg(long)]
    pub no_verify: bool,
}

// ============================================================================
// PKI command
// ============================================================================

#[derive(Args, Debug)]
pub struct PkiArgs {
    /// Certificate lifetime in days
    #[arg(long, global = true, default_value = "365")]
    pub days: u32,

    /// openssl executable
    #[arg(long, global = true, default_value = "openssl")]
    pub openssl: String,

    #[command(subcommand)]
    pub command: PkiCommands,
}

#[derive(Subcommand, Debug)]
pub enum PkiCommands {
    /// Create the self-signed pseudonym authority
    Ca,

    /// Issue numbered pseudonyms for a group
    Pseudonyms {
        /// Group name, e.g. OBU-A
        group: String,

        /// Pseudonyms to issue
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Issue the naming authority's certificate
    Authority {
        /// Authority name (defaults to the configured one)
        name: Option<String>,
    },
}

// ============================================================================
// Filter command
// ============================================================================

#[derive(Args, Debug)]
pub struct FilterArgs {
    #[command(subcommand)]
    pub command: FilterCommands,
}

#[derive(Subcommand, Debug)]
pub enum FilterCommands {
    /// Build a filter of random records plus the benign record
    Build {
        /// Expected element count (overrides config)
        #[arg(short = 'n', long)]
        elements: Option<u64>,

        /// Target false-positive rate (overrides config)
        #[arg(short = 'p', long)]
        rate: Option<f64>,

        /// Output file (defaults to the configured filter path)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Test whether a record is vouched for
    Check {
        /// Record, `hostname=xxxx:...`
        record: String,

        /// Filter file (defaults to the configured filter path)
        #[arg(long)]
        filter: Option<PathBuf>,
    },
}
