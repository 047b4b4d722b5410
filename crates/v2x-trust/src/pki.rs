//! Pseudonym certificate authority and on-disk certificate store.
//!
//! Key material is produced by the `openssl` command line tool: an
//! ECDSA P-256 authority, then per-identity keys, signing requests and
//! authority-signed certificates valid for a fixed number of days. Private
//! keys are exported as unencrypted PKCS#8 DER for [`Signer::load`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::crypto::{Certificate, Credentials, Signer};
use v2x_core::{Result, V2xError};

/// Authority certificate file name.
pub const CA_CERTIFICATE: &str = "CA-certificate.crt";
/// Authority private key file name (PEM, never leaves the PKI directory).
pub const CA_PRIVATE_KEY: &str = "CA-private-key.pem";

/// Names one identity in the store: a group (`OBU-A`, `OBU-X`, `DNS`) and an
/// optional pseudonym index within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId {
    /// Group prefix of every file name
    pub group: String,
    /// Pseudonym index; `None` for single-identity groups such as the naming authority
    pub index: Option<u32>,
}

impl KeyId {
    /// Pseudonym `index` of `group`.
    pub fn pseudonym(group: impl Into<String>, index: u32) -> Self {
        Self {
            group: group.into(),
            index: Some(index),
        }
    }

    /// A group with exactly one identity.
    pub fn single(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            index: None,
        }
    }

    fn file_name(&self, kind: &str, ext: &str) -> String {
        match self.index {
            Some(i) => format!("{}-{kind}{i}.{ext}", self.group),
            None => format!("{}-{kind}.{ext}", self.group),
        }
    }

    /// `<group>-certificate<index>.crt`
    #[must_use]
    pub fn certificate_file(&self) -> String {
        self.file_name("certificate", "crt")
    }

    /// `<group>-private-key<index>.der`
    #[must_use]
    pub fn private_key_file(&self) -> String {
        self.file_name("private-key", "der")
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}#{i}", self.group),
            None => f.write_str(&self.group),
        }
    }
}

/// Directory of certificates and keys, addressed by [`KeyId`].
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    /// Store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an identity's certificate.
    #[must_use]
    pub fn certificate_path(&self, id: &KeyId) -> PathBuf {
        self.dir.join(id.certificate_file())
    }

    /// Path of an identity's private key.
    #[must_use]
    pub fn private_key_path(&self, id: &KeyId) -> PathBuf {
        self.dir.join(id.private_key_file())
    }

    /// Load the authority certificate.
    pub fn authority(&self) -> Result<Certificate> {
        Certificate::load(&self.dir.join(CA_CERTIFICATE))
    }

    /// Load an identity's certificate.
    pub fn get(&self, id: &KeyId) -> Result<Certificate> {
        Certificate::load(&self.certificate_path(id))
    }

    /// Load an identity's certificate and key.
    pub fn credentials(&self, id: &KeyId) -> Result<Credentials> {
        Credentials::load(&self.certificate_path(id), &self.private_key_path(id))
    }

    /// Load pseudonyms `0..count` of `group`.
    pub fn pseudonyms(&self, group: &str, count: u32) -> Result<Vec<Credentials>> {
        (0..count)
            .map(|i| self.credentials(&KeyId::pseudonym(group, i)))
            .collect()
    }

    /// Load an identity's private key alone.
    pub fn signer(&self, id: &KeyId) -> Result<Signer> {
        Signer::load(&self.private_key_path(id))
    }
}

/// Issues certificates by shelling out to `openssl`.
#[derive(Debug, Clone)]
pub struct OpensslPki {
    program: String,
    store: CertificateStore,
    validity_days: u32,
    organization: String,
}

impl OpensslPki {
    /// Issue into `store` with the system `openssl`.
    #[must_use]
    pub fn new(store: CertificateStore) -> Self {
        Self {
            program: "openssl".to_string(),
            store,
            validity_days: 365,
            organization: "V2X Testbed".to_string(),
        }
    }

    /// Use a different executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Certificate lifetime in days.
    #[must_use]
    pub const fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// The store certificates are written to.
    #[must_use]
    pub const fn store(&self) -> &CertificateStore {
        &self.store
    }

    fn subject(&self, common_name: &str) -> String {
        format!("/C=SE/O={}/CN={common_name}", self.organization)
    }

    /// Argument lists that create the self-signed authority.
    #[must_use]
    pub fn authority_commands(&self) -> Vec<Vec<String>> {
        let days = self.validity_days.to_string();
        vec![
            args(&["ecparam", "-name", "prime256v1", "-genkey", "-noout", "-out", CA_PRIVATE_KEY]),
            args(&[
                "req",
                "-x509",
                "-new",
                "-key",
                CA_PRIVATE_KEY,
                "-sha256",
                "-days",
                &days,
                "-subj",
                &self.subject("V2X Pseudonym Authority"),
                "-out",
                CA_CERTIFICATE,
            ]),
        ]
    }

    /// Argument lists that issue one identity signed by the authority.
    #[must_use]
    pub fn identity_commands(&self, id: &KeyId) -> Vec<Vec<String>> {
        let stem = id.private_key_file();
        let stem = stem.trim_end_matches(".der");
        let key_pem = format!("{stem}.pem");
        let csr = format!("{stem}.csr");
        let days = self.validity_days.to_string();
        let cn = id.to_string().replace('#', "-");
        vec![
            args(&["ecparam", "-name", "prime256v1", "-genkey", "-noout", "-out", &key_pem]),
            args(&["req", "-new", "-key", &key_pem, "-subj", &self.subject(&cn), "-out", &csr]),
            args(&[
                "x509",
                "-req",
                "-in",
                &csr,
                "-CA",
                CA_CERTIFICATE,
                "-CAkey",
                CA_PRIVATE_KEY,
                "-CAcreateserial",
                "-sha256",
                "-days",
                &days,
                "-out",
                &id.certificate_file(),
            ]),
            args(&[
                "pkcs8",
                "-topk8",
                "-nocrypt",
                "-inform",
                "PEM",
                "-in",
                &key_pem,
                "-outform",
                "DER",
                "-out",
                &id.private_key_file(),
            ]),
        ]
    }

    /// Create the authority key and self-signed certificate.
    pub fn create_authority(&self) -> Result<Certificate> {
        self.prepare_dir()?;
        for command in self.authority_commands() {
            self.run(&command)?;
        }
        info!(dir = %self.store.dir().display(), "created pseudonym authority");
        self.store.authority()
    }

    /// Issue one identity.
    pub fn issue(&self, id: &KeyId) -> Result<Certificate> {
        self.prepare_dir()?;
        for command in self.identity_commands(id) {
            self.run(&command)?;
        }
        debug!(identity = %id, "issued certificate");
        self.store.get(id)
    }

    /// Issue pseudonyms `0..count` of `group`.
    pub fn issue_pseudonyms(&self, group: &str, count: u32) -> Result<Vec<Certificate>> {
        let issued = (0..count)
            .map(|i| self.issue(&KeyId::pseudonym(group, i)))
            .collect::<Result<Vec<_>>>()?;
        info!(group, count, "issued pseudonyms");
        Ok(issued)
    }

    fn prepare_dir(&self) -> Result<()> {
        std::fs::create_dir_all(self.store.dir())
            .map_err(|e| V2xError::storage(self.store.dir().display(), e))
    }

    fn run(&self, command: &[String]) -> Result<()> {
        let rendered = format!("{} {}", self.program, command.join(" "));
        debug!(command = %rendered, "running pki command");
        let output = Command::new(&self.program)
            .args(command)
            .current_dir(self.store.dir())
            .output()
            .map_err(|e| V2xError::Pki {
                command: rendered.clone(),
                status: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(V2xError::Pki {
                command: rendered,
                status: format!("{} ({})", output.status, stderr.trim()),
            })
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}
