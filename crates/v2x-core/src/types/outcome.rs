use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal classification of a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Authenticated, vouched for, and equal to the expected record
    TrustedBenign,
    /// Authenticated and vouched for, but not the expected record
    TrustedMalicious,
    /// Outer signature, digest or certificate check failed
    UntrustedSignature,
    /// Sender certificate is on the revocation list
    UntrustedRevoked,
    /// Inner record is not vouched for by the authority
    UntrustedFilterMiss,
    /// Envelope could not be parsed or decoded
    UntrustedMalformed,
}

impl Outcome {
    /// All classifications, in reporting order.
    pub const ALL: [Self; 6] = [
        Self::TrustedBenign,
        Self::TrustedMalicious,
        Self::UntrustedSignature,
        Self::UntrustedRevoked,
        Self::UntrustedFilterMiss,
        Self::UntrustedMalformed,
    ];

    /// Returns true if the response passed every trust check
    #[must_use]
    pub const fn is_trusted(self) -> bool {
        matches!(self, Self::TrustedBenign | Self::TrustedMalicious)
    }

    /// Stable label used in logs and summaries.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TrustedBenign => "trusted-benign",
            Self::TrustedMalicious => "trusted-malicious",
            Self::UntrustedSignature => "untrusted-signature",
            Self::UntrustedRevoked => "untrusted-revoked",
            Self::UntrustedFilterMiss => "untrusted-filter-miss",
            Self::UntrustedMalformed => "untrusted-malformed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Timing measured for one classified response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    /// Datagram receipt to classification
    pub process_response: Duration,
    /// Query dispatch timestamp (embedded in the response) to classification.
    /// `None` when the response carried no usable timestamp.
    pub round_trip: Option<Duration>,
}
