//! Bloom filter over authority-vouched AAAA records.
//!
//! Sized from an expected element count `n` and target false-positive rate
//! `p`: `m = ceil(-n ln p / (ln 2)^2)` bits and `k = round(m / n * ln 2)`
//! hash functions. Bit positions use double hashing, `h1 + i * h2 mod m`, where
//! `h1` and `h2` are disjoint halves of `SHA-256(seed || record)`.
//!
//! The serialized form is CBOR and carries the sizing and seed, so a filter
//! built on one host answers identically on every other.

use rand::Rng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::f64::consts::LN_2;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::crypto::sha256;
use v2x_core::{AaaaRecord, Result, V2xError};

/// Largest bit array a filter may hold (256 MiB).
pub const MAX_FILTER_BITS: u64 = 1 << 31;

/// Packed bit array, serialized as a CBOR byte string.
#[derive(Clone, PartialEq, Eq)]
struct BitArray(Vec<u8>);

impl BitArray {
    fn zeroed(bits: u64) -> Result<Self> {
        let bytes = usize::try_from(bits.div_ceil(8))
            .map_err(|_| V2xError::Filter(format!("{bits} bits does not fit in memory")))?;
        Ok(Self(vec![0u8; bytes]))
    }

    fn set(&mut self, index: u64) {
        // index < m <= 8 * len, checked at construction
        #[allow(clippy::cast_possible_truncation)]
        let byte = (index / 8) as usize;
        self.0[byte] |= 1 << (index % 8);
    }

    fn get(&self, index: u64) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (index / 8) as usize;
        self.0[byte] & (1 << (index % 8)) != 0
    }
}

impl Serialize for BitArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for BitArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BitArrayVisitor;

        impl<'de> Visitor<'de> for BitArrayVisitor {
            type Value = BitArray;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<BitArray, E> {
                Ok(BitArray(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<BitArray, E> {
                Ok(BitArray(v))
            }
        }

        deserializer.deserialize_byte_buf(BitArrayVisitor)
    }
}

/// Probabilistic membership set of signed records.
///
/// Never reports a false negative. False positives occur at roughly the
/// configured rate once `n` records are inserted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRecordFilter {
    /// Bit count `m`
    bits_len: u64,
    /// Hash function count `k`
    hashes: u32,
    /// Mixed into every position so independently built filters differ
    seed: u64,
    /// Records added so far
    inserted: u64,
    bits: BitArray,
}

impl SignedRecordFilter {
    /// Size a filter for `expected_elements` at `false_positive_rate`, with a
    /// random seed.
    pub fn build(expected_elements: u64, false_positive_rate: f64) -> Result<Self> {
        Self::with_seed(expected_elements, false_positive_rate, rand::random())
    }

    /// Size a filter with an explicit seed.
    pub fn with_seed(expected_elements: u64, false_positive_rate: f64, seed: u64) -> Result<Self> {
        if expected_elements == 0 {
            return Err(V2xError::Filter("expected element count must be positive".to_string()));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(V2xError::Filter(format!(
                "false positive rate must be in (0, 1), got {false_positive_rate}"
            )));
        }
        let (bits_len, hashes) = optimal_sizing(expected_elements, false_positive_rate);
        if bits_len > MAX_FILTER_BITS {
            return Err(V2xError::Filter(format!(
                "{expected_elements} elements at rate {false_positive_rate} need {bits_len} bits, limit is {MAX_FILTER_BITS}"
            )));
        }
        Ok(Self {
            bits_len,
            hashes,
            seed,
            inserted: 0,
            bits: BitArray::zeroed(bits_len)?,
        })
    }

    /// Build the filter an authority publishes: `expected_elements` random
    /// records plus every record in `vouched`.
    pub fn publish<R: Rng>(
        expected_elements: u64,
        false_positive_rate: f64,
        vouched: &[&str],
        rng: &mut R,
    ) -> Result<Self> {
        let mut filter = Self::with_seed(expected_elements, false_positive_rate, rng.gen())?;
        for _ in 0..expected_elements {
            filter.add(&AaaaRecord::random(rng).to_string());
        }
        for record in vouched {
            filter.add(record);
        }
        Ok(filter)
    }

    /// Add a record.
    pub fn add(&mut self, record: &str) {
        for position in bit_positions(self.seed, self.bits_len, self.hashes, record) {
            self.bits.set(position);
        }
        self.inserted += 1;
    }

    /// False means the record was certainly never added.
    #[must_use]
    pub fn probably_contains(&self, record: &str) -> bool {
        bit_positions(self.seed, self.bits_len, self.hashes, record)
            .all(|position| self.bits.get(position))
    }

    /// Bit count `m`.
    #[must_use]
    pub const fn bits_len(&self) -> u64 {
        self.bits_len
    }

    /// Hash function count `k`.
    #[must_use]
    pub const fn hash_count(&self) -> u32 {
        self.hashes
    }

    /// Records added so far.
    #[must_use]
    pub const fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Expected false-positive rate at the current fill, `(1 - e^(-kn/m))^k`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let k = f64::from(self.hashes);
        let fill = -k * self.inserted as f64 / self.bits_len as f64;
        (1.0 - fill.exp()).powf(k)
    }

    /// Encode as CBOR.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| V2xError::Filter(e.to_string()))?;
        Ok(out)
    }

    /// Decode from CBOR, checking that the sizing matches the bit array.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let filter: Self =
            ciborium::from_reader(bytes).map_err(|e| V2xError::Filter(e.to_string()))?;
        if filter.bits_len == 0 || filter.hashes == 0 {
            return Err(V2xError::Filter("filter has zero size".to_string()));
        }
        if filter.bits_len > MAX_FILTER_BITS {
            return Err(V2xError::Filter(format!(
                "filter claims {} bits, limit is {MAX_FILTER_BITS}",
                filter.bits_len
            )));
        }
        let expected_bytes = filter.bits_len.div_ceil(8);
        if filter.bits.0.len() as u64 != expected_bytes {
            return Err(V2xError::Filter(format!(
                "filter claims {} bits but carries {} bytes",
                filter.bits_len,
                filter.bits.0.len()
            )));
        }
        Ok(filter)
    }

    /// Read a filter file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| V2xError::storage(path.display(), e))?;
        let filter = Self::deserialize(&bytes)?;
        info!(
            path = %path.display(),
            bits = filter.bits_len,
            hashes = filter.hashes,
            inserted = filter.inserted,
            "loaded signed-record filter"
        );
        Ok(filter)
    }

    /// Write the filter to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.serialize()?).map_err(|e| V2xError::storage(path.display(), e))
    }
}

impl fmt::Debug for SignedRecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRecordFilter")
            .field("bits_len", &self.bits_len)
            .field("hashes", &self.hashes)
            .field("inserted", &self.inserted)
            .finish_non_exhaustive()
    }
}

/// Bit positions of `record` for a filter with the given sizing and seed.
#[allow(clippy::cast_possible_truncation)]
fn bit_positions(
    seed: u64,
    bits_len: u64,
    hashes: u32,
    record: &str,
) -> impl Iterator<Item = u64> {
    let mut input = Vec::with_capacity(8 + record.len());
    input.extend_from_slice(&seed.to_be_bytes());
    input.extend_from_slice(record.as_bytes());
    let digest = sha256(&input);

    let mut h1 = [0u8; 8];
    h1.copy_from_slice(&digest[..8]);
    let mut h2 = [0u8; 8];
    h2.copy_from_slice(&digest[8..16]);
    let h1 = u128::from(u64::from_be_bytes(h1));
    // Odd stride so consecutive positions never collapse onto one bit.
    let h2 = u128::from(u64::from_be_bytes(h2) | 1);
    let m = u128::from(bits_len);

    (0..u128::from(hashes)).map(move |i| ((h1 + i * h2) % m) as u64)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn optimal_sizing(n: u64, p: f64) -> (u64, u32) {
    let n = n as f64;
    let m = (-n * p.ln() / (LN_2 * LN_2)).ceil().max(1.0);
    let k = (m / n * LN_2).round().max(1.0);
    (m as u64, k as u32)
}
