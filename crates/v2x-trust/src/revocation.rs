//! File-backed revocation list.
//!
//! One certificate identity (base64 DER) per line. Lookups scan the whole
//! file; revocations append. Duplicates are kept, so the file doubles as a
//! log of how many times a sender misbehaved.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use v2x_core::{Result, V2xError};

/// Persistent set of revoked certificate identities.
#[derive(Debug, Clone)]
pub struct RevocationRegistry {
    path: PathBuf,
}

impl RevocationRegistry {
    /// Use the list stored at `path`. The file is not touched until used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the list, creating the file if needed.
    pub async fn reset(&self) -> Result<()> {
        tokio::fs::write(&self.path, b"")
            .await
            .map_err(|e| self.storage_error(e))?;
        info!(path = %self.path.display(), "revocation list reset");
        Ok(())
    }

    /// True if any line equals `identity` exactly.
    pub async fn contains(&self, identity: &str) -> Result<bool> {
        Ok(self.occurrences(identity).await? > 0)
    }

    /// Append `identity` as a new line. Already revoked identities are
    /// appended again.
    ///
    /// The list must already exist; see [`Self::reset`].
    pub async fn revoke(&self, identity: &str) -> Result<()> {
        if identity.contains(['\n', '\r']) {
            return Err(self.storage_error("identity contains a line break"));
        }
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.storage_error(e))?;
        let mut line = String::with_capacity(identity.len() + 1);
        line.push_str(identity);
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.storage_error(e))?;
        file.flush().await.map_err(|e| self.storage_error(e))?;
        debug!(path = %self.path.display(), "identity revoked");
        Ok(())
    }

    /// How many times `identity` has been revoked.
    pub async fn occurrences(&self, identity: &str) -> Result<usize> {
        Ok(self
            .entries()
            .await?
            .iter()
            .filter(|line| line.as_str() == identity)
            .count())
    }

    /// Every line of the list, in append order.
    pub async fn entries(&self) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.storage_error(e))?;
        Ok(content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn storage_error(&self, reason: impl std::fmt::Display) -> V2xError {
        V2xError::storage(self.path.display(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh() -> (tempfile::TempDir, RevocationRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = RevocationRegistry::new(dir.path().join("CRL-A.crl"));
        registry.reset().await.unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn test_revoke_then_contains() {
        let (_dir, registry) = fresh().await;
        assert!(!registry.contains("MIIBcert").await.unwrap());

        registry.revoke("MIIBcert").await.unwrap();
        assert!(registry.contains("MIIBcert").await.unwrap());
        assert!(!registry.contains("MIIBother").await.unwrap());
    }

    #[tokio::test]
    async fn test_match_is_exact_not_prefix() {
        let (_dir, registry) = fresh().await;
        registry.revoke("MIIBcertificate").await.unwrap();
        assert!(!registry.contains("MIIBcert").await.unwrap());
        assert!(!registry.contains("MIIBcertificate2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let (_dir, registry) = fresh().await;
        registry.revoke("MIIBcert").await.unwrap();
        registry.revoke("MIIBcert").await.unwrap();
        registry.revoke("MIIBother").await.unwrap();

        assert_eq!(registry.occurrences("MIIBcert").await.unwrap(), 2);
        assert_eq!(registry.entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let (dir, registry) = fresh().await;
        registry.revoke("MIIBcert").await.unwrap();

        let reopened = RevocationRegistry::new(dir.path().join("CRL-A.crl"));
        assert!(reopened.contains("MIIBcert").await.unwrap());

        reopened.reset().await.unwrap();
        assert!(!registry.contains("MIIBcert").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_store_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RevocationRegistry::new(dir.path().join("absent.crl"));

        assert!(registry.contains("x").await.unwrap_err().is_storage());
        assert!(registry.revoke("x").await.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_line_breaks_rejected() {
        let (_dir, registry) = fresh().await;
        assert!(registry.revoke("a\nb").await.is_err());
        assert!(registry.entries().await.unwrap().is_empty());
    }
}
