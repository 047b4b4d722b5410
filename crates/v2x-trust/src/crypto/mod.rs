//! Certificates, keys, digests and the trust checks built on them.

mod certificate;
pub mod hash;
mod signer;
mod verifier;

#[cfg(test)]
pub(crate) mod test_pki;

pub use certificate::{Certificate, SignatureScheme};
pub use hash::{sha256, sha256_hex};
pub use signer::{Credentials, Signer};
pub use verifier::{verify_digest, verify_signature, TrustVerifier};
