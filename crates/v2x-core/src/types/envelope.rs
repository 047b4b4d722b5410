//! Wire envelope: an ordered map of named string fields.
//!
//! Envelopes travel as CBOR. A nested envelope is carried inside the outer
//! `Answer` field as base64 of its CBOR bytes, so the outer signature covers
//! the inner envelope verbatim.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, V2xError};

/// Largest UDP payload the listener accepts.
pub const MAX_DATAGRAM: usize = 65_508;

/// Value carried in the `Query` field of a challenge.
pub const QUERY_TOKEN: &str = "Query";

/// Recognized envelope field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Challenge payload
    Query,
    /// Sender certificate (base64 DER)
    Certificate,
    /// Signature over the SHA-256 digest of the signed payload (base64)
    Hash,
    /// Dispatch timestamp of the query, epoch milliseconds
    Time,
    /// Round sequence number
    TestNumber,
    /// Response payload, or a nested envelope
    Answer,
}

impl Field {
    /// Field name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Certificate => "Certificate",
            Self::Hash => "Hash",
            Self::Time => "Time",
            Self::TestNumber => "TestNumber",
            Self::Answer => "Answer",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered mapping of field names to string values.
///
/// Unknown fields are preserved on decode and ignored by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope {
    fields: BTreeMap<String, String>,
}

impl Envelope {
    /// Create an empty envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: Field, value: impl Into<String>) {
        self.fields.insert(field.as_str().to_string(), value.into());
    }

    /// Get a field value if present.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(field.as_str()).map(String::as_str)
    }

    /// Get a field value or fail with [`V2xError::MissingField`].
    pub fn require(&self, field: Field) -> Result<&str> {
        self.get(field).ok_or(V2xError::MissingField(field))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the envelope has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dispatch timestamp embedded by the querier, if present and numeric.
    #[must_use]
    pub fn dispatch_time_ms(&self) -> Option<i64> {
        self.get(Field::Time).and_then(|t| t.parse().ok())
    }

    /// Round number embedded by the querier, if present and numeric.
    #[must_use]
    pub fn test_number(&self) -> Option<u64> {
        self.get(Field::TestNumber).and_then(|n| n.parse().ok())
    }

    /// Encode as CBOR for transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| V2xError::Envelope(e.to_string()))?;
        Ok(out)
    }

    /// Decode from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| V2xError::Envelope(e.to_string()))
    }

    /// Encode as base64 of CBOR, for nesting inside another envelope.
    pub fn to_base64(&self) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_bytes()?))
    }

    /// Decode a nested envelope from base64 of CBOR.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| V2xError::Envelope(format!("base64 decode failed: {e}")))?;
        Self::from_bytes(&bytes)
    }
}
