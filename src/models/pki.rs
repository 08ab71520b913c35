//! PKI directory layout snapshot

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Canonical paths under a PKI root. Existence checks hit the filesystem on
/// every call, so an old value never goes stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PkiInfo {
    pub pki_dir: PathBuf,
    pub ca_cert_path: PathBuf,
    pub ca_key_path: PathBuf,
    pub issued_dir: PathBuf,
    pub private_dir: PathBuf,
    pub reqs_dir: PathBuf,
    pub revoked_dir: PathBuf,
    pub index_file: PathBuf,
    pub serial_file: PathBuf,
}

impl PkiInfo {
    /// Build the easy-rsa layout rooted at `pki_dir`
    pub fn for_root(pki_dir: &Path) -> Self {
        Self {
            ca_cert_path: pki_dir.join("ca.crt"),
            ca_key_path: pki_dir.join("private").join("ca.key"),
            issued_dir: pki_dir.join("issued"),
            private_dir: pki_dir.join("private"),
            reqs_dir: pki_dir.join("reqs"),
            revoked_dir: pki_dir.join("revoked"),
            index_file: pki_dir.join("index.txt"),
            serial_file: pki_dir.join("serial"),
            pki_dir: pki_dir.to_path_buf(),
        }
    }

    /// PKI directory and index file both exist
    pub fn is_initialized(&self) -> bool {
        self.pki_dir.is_dir() && self.index_file.is_file()
    }

    pub fn ca_cert_exists(&self) -> bool {
        self.ca_cert_path.is_file()
    }

    pub fn ca_key_exists(&self) -> bool {
        self.ca_key_path.is_file()
    }

    /// CA certificate and CA private key both exist
    pub fn has_ca(&self) -> bool {
        self.ca_cert_exists() && self.ca_key_exists()
    }
}

/// Files easy-rsa keeps for one named entity. Only existing files are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<PathBuf>,
}

impl CertificateArtifacts {
    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.private_key.is_none() && self.request.is_none()
    }
}
