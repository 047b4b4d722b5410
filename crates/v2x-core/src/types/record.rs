//! AAAA address records as carried in answers and stored in the signed-record filter.
//!
//! The textual form is `hostname=xxxx:xxxx:xxxx:xxxx:xxxx:xxxx:xxxx:xxxx`
//! with every group zero-padded, so one address has exactly one spelling.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::error::V2xError;

/// The record a benign resolver answers with.
pub const BENIGN_RECORD: &str = "resolver.v2x.test=0000:1111:2222:3333:4444:5555:6666:7777";

/// The record a compromised participant forges.
pub const MALICIOUS_RECORD: &str = "rogue.v2x.test=2001:0db8:85a3:0000:0000:8a2e:0370:7334";

const HOSTNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A hostname bound to an IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AaaaRecord {
    /// Fully qualified host name
    pub hostname: String,
    /// Resolved address
    pub address: Ipv6Addr,
}

impl AaaaRecord {
    /// Create a record.
    pub fn new(hostname: impl Into<String>, address: Ipv6Addr) -> Self {
        Self {
            hostname: hostname.into(),
            address,
        }
    }

    /// Generate a record with a random three-label hostname and random address.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let labels: Vec<String> = (0..3)
            .map(|_| {
                let len = rng.gen_range(3..=12);
                (0..len)
                    .map(|_| char::from(HOSTNAME_ALPHABET[rng.gen_range(0..HOSTNAME_ALPHABET.len())]))
                    .collect()
            })
            .collect();
        Self::new(labels.join("."), Ipv6Addr::from(rng.gen::<u128>()))
    }
}

impl fmt::Display for AaaaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .address
            .segments()
            .iter()
            .map(|s| format!("{s:04x}"))
            .collect();
        write!(f, "{}={}", self.hostname, groups.join(":"))
    }
}

impl FromStr for AaaaRecord {
    type Err = V2xError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostname, address) = s
            .split_once('=')
            .ok_or_else(|| V2xError::Envelope(format!("not an AAAA record: {s}")))?;
        if hostname.is_empty() {
            return Err(V2xError::Envelope(format!("AAAA record without hostname: {s}")));
        }
        let address = address
            .parse()
            .map_err(|e| V2xError::Envelope(format!("invalid IPv6 address in {s}: {e}")))?;
        Ok(Self::new(hostname, address))
    }
}
