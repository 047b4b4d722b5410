//! Experiment scenarios: which checks run on queries and answers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use v2x_core::V2xError;

/// One of the four testbed configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Unsigned queries and answers
    Plain,
    /// Signed queries, signed answers
    Signed,
    /// Signed answers wrapping a record signed by the naming authority
    Nested,
    /// Signed answers wrapping a record checked against the authority's filter
    #[default]
    Filtered,
}

impl Scenario {
    /// All scenarios, numbered 1 to 4 in this order.
    pub const ALL: [Self; 4] = [Self::Plain, Self::Signed, Self::Nested, Self::Filtered];

    /// Scenario by its experiment number (1-based).
    #[must_use]
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Experiment number (1-based).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Plain => 1,
            Self::Signed => 2,
            Self::Nested => 3,
            Self::Filtered => 4,
        }
    }

    /// Queries and outer answers carry `Certificate` and `Hash`.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Answers wrap a nested inner envelope.
    #[must_use]
    pub const fn is_nested(self) -> bool {
        matches!(self, Self::Nested | Self::Filtered)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Signed => "signed",
            Self::Nested => "nested",
            Self::Filtered => "filtered",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = V2xError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_number(n)
                .ok_or_else(|| V2xError::Config(format!("no scenario numbered {n}")));
        }
        Self::ALL
            .into_iter()
            .find(|sc| sc.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| V2xError::Config(format!("unknown scenario: {s}")))
    }
}
