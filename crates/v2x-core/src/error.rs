use thiserror::Error;

use crate::types::Field;

/// Result type alias for testbed operations
pub type Result<T> = std::result::Result<T, V2xError>;

/// Errors that can occur in the V2X trust testbed
#[derive(Error, Debug)]
pub enum V2xError {
    /// Socket or other I/O failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Revocation list or filter file could not be read or written
    #[error("storage error at {path}: {reason}")]
    Storage {
        /// Path of the backing file
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Envelope could not be encoded or decoded
    #[error("envelope error: {0}")]
    Envelope(String),

    /// A required envelope field was absent
    #[error("missing envelope field: {0}")]
    MissingField(Field),

    /// Certificate could not be decoded or parsed
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Key loading or signing failed
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Invalid filter sizing or corrupt filter file
    #[error("filter error: {0}")]
    Filter(String),

    /// Configuration is invalid
    #[error("config error: {0}")]
    Config(String),

    /// External PKI tool exited unsuccessfully
    #[error("pki command `{command}` failed with status {status}")]
    Pki {
        /// The command line that was run
        command: String,
        /// Exit status description
        status: String,
    },

    /// A round exceeded its attempt budget without a readiness signal
    #[error("round {round} gave up after {attempts} attempts")]
    RoundExhausted {
        /// Logical round number
        round: u64,
        /// Attempts made
        attempts: u32,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl V2xError {
    /// Build a storage error for a path.
    pub fn storage(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error came from the socket layer
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if the error came from persisted state
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
