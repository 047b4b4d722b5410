//! Shared fixtures for end-to-end tests.

#![allow(dead_code)]

use std::path::Path;

use v2x_trust::{Certificate, Credentials, RevocationRegistry, Signer};

#[path = "../../src/crypto/test_pki.rs"]
mod test_pki;

pub(crate) use test_pki::TestPki;

pub async fn empty_registry(dir: &Path) -> RevocationRegistry {
    let registry = RevocationRegistry::new(dir.join("CRL-A.crl"));
    registry.reset().await.unwrap();
    registry
}
