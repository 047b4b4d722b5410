//! SHA-256 digests via `ring::digest`.

use ring::digest::SHA256;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Compute the SHA-256 digest of a payload.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let digest = ring::digest::digest(&SHA256, data);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Lowercase hex SHA-256 of raw bytes (certificate fingerprints).
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_query_token() {
        // The digest every signed query commits to.
        assert_eq!(sha256(b"Query").len(), DIGEST_LEN);
        assert_eq!(sha256(b"Query"), sha256(b"Query"));
        assert_ne!(sha256(b"Query"), sha256(b"query"));
    }
}
