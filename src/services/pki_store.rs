//! PKI directory queries
//!
//! Read-only views over an easy-rsa PKI tree, plus the one filesystem
//! maintenance task this layer performs itself (`cleanup_revoked`). Nothing
//! is cached: the CA tool rewrites the tree out-of-band, so every call reads
//! the filesystem again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::EasyRsaConfig;
use crate::models::{
    Certificate, CertificateArtifacts, CertificateCounts, CertificateRequest, CertificateStatus,
    PkiInfo,
};
use crate::services::parser::parse_index_file;

const CERT_EXTENSION: &str = "crt";
const KEY_EXTENSION: &str = "key";
const REQ_EXTENSION: &str = "req";

/// Longer than any certificate the CA tool will issue
const MAX_HORIZON_DAYS: i64 = 100 * 365;

/// Query layer over one PKI root
#[derive(Debug, Clone)]
pub struct PkiStore {
    pki_dir: PathBuf,
}

impl PkiStore {
    pub fn new(pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            pki_dir: pki_dir.into(),
        }
    }

    pub fn from_config(config: &EasyRsaConfig) -> Self {
        Self::new(config.pki_dir.clone())
    }

    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    /// Fresh layout snapshot
    pub fn get_pki_info(&self) -> PkiInfo {
        PkiInfo::for_root(&self.pki_dir)
    }

    pub fn is_initialized(&self) -> bool {
        self.get_pki_info().is_initialized()
    }

    pub fn has_ca(&self) -> bool {
        self.get_pki_info().has_ca()
    }

    /// All index records, optionally restricted to one status
    pub fn list_certificates(&self, status: Option<CertificateStatus>) -> Vec<Certificate> {
        let info = self.get_pki_info();
        if !info.index_file.exists() {
            debug!("Index file not found at {:?}", info.index_file);
            return Vec::new();
        }

        let certs = parse_index_file(&info.index_file);
        match status {
            Some(status) => certs.into_iter().filter(|c| c.status == status).collect(),
            None => certs,
        }
    }

    /// First record whose common name matches exactly
    pub fn get_certificate_by_name(&self, name: &str) -> Option<Certificate> {
        self.list_certificates(None)
            .into_iter()
            .find(|c| c.common_name == name)
    }

    pub fn count_certificates(&self) -> CertificateCounts {
        self.list_certificates(None)
            .iter()
            .fold(CertificateCounts::default(), |mut counts, cert| {
                counts.total += 1;
                match cert.status {
                    CertificateStatus::Valid => counts.valid += 1,
                    CertificateStatus::Revoked => counts.revoked += 1,
                    CertificateStatus::Expired => counts.expired += 1,
                }
                counts
            })
    }

    /// Currently valid certificates that expire within `days` from now
    pub fn expiring_within(&self, days: i64) -> Vec<Certificate> {
        let now = Utc::now();
        let horizon = now + Duration::days(days.clamp(0, MAX_HORIZON_DAYS));

        let mut certs: Vec<Certificate> = self
            .list_certificates(Some(CertificateStatus::Valid))
            .into_iter()
            .filter(|c| c.is_valid_at(now) && c.expires_at <= horizon)
            .collect();
        certs.sort_by_key(|c| c.expires_at);
        certs
    }

    /// Sorted request names (file stems of `reqs/*.req`)
    pub fn list_certificate_requests(&self) -> Vec<String> {
        let reqs_dir = self.get_pki_info().reqs_dir;
        let entries = match fs::read_dir(&reqs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read requests directory {:?}: {}", reqs_dir, e);
                }
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(REQ_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(String::from)
            })
            .collect();

        names.sort();
        names
    }

    /// Pending requests with their file paths. Subject fields are left unset.
    pub fn list_pending_requests(&self) -> Vec<CertificateRequest> {
        let reqs_dir = self.get_pki_info().reqs_dir;
        self.list_certificate_requests()
            .into_iter()
            .map(|name| {
                let req_file = reqs_dir.join(format!("{}.{}", name, REQ_EXTENSION));
                CertificateRequest::new(name, req_file)
            })
            .collect()
    }

    pub fn get_certificate_path(&self, name: &str) -> Option<PathBuf> {
        let info = self.get_pki_info();
        existing(info.issued_dir.join(format!("{}.{}", name, CERT_EXTENSION)))
    }

    pub fn get_private_key_path(&self, name: &str) -> Option<PathBuf> {
        let info = self.get_pki_info();
        existing(info.private_dir.join(format!("{}.{}", name, KEY_EXTENSION)))
    }

    pub fn get_request_path(&self, name: &str) -> Option<PathBuf> {
        let info = self.get_pki_info();
        existing(info.reqs_dir.join(format!("{}.{}", name, REQ_EXTENSION)))
    }

    pub fn get_ca_cert_path(&self) -> Option<PathBuf> {
        existing(self.get_pki_info().ca_cert_path)
    }

    /// Issued certificate, private key and request for `name`, where present
    pub fn certificate_artifacts(&self, name: &str) -> CertificateArtifacts {
        CertificateArtifacts {
            certificate: self.get_certificate_path(name),
            private_key: self.get_private_key_path(name),
            request: self.get_request_path(name),
        }
    }

    /// Locate the vars file: the PKI's own, else the one shipped next to easy-rsa
    pub fn find_vars_file(&self, easyrsa_bin: &Path) -> Option<PathBuf> {
        let mut candidates = vec![self.pki_dir.join("vars")];
        if let Some(easyrsa_dir) = easyrsa_bin.parent() {
            candidates.push(easyrsa_dir.join("vars"));
            candidates.push(easyrsa_dir.join("vars.example"));
        }
        candidates.into_iter().find(|path| path.is_file())
    }

    /// Move issued files of revoked certificates into `revoked/`.
    ///
    /// Returns the number of files moved. A failed move is logged and skipped.
    pub fn cleanup_revoked(&self) -> usize {
        let info = self.get_pki_info();
        let revoked = self.list_certificates(Some(CertificateStatus::Revoked));

        let mut moved = 0;
        for cert in &revoked {
            let file_name = format!("{}.{}", cert.common_name, CERT_EXTENSION);
            let source = info.issued_dir.join(&file_name);
            if cert.common_name.is_empty() || !source.is_file() {
                continue;
            }

            let dest = info.revoked_dir.join(&file_name);
            match fs::create_dir_all(&info.revoked_dir).and_then(|_| move_file(&source, &dest)) {
                Ok(()) => {
                    debug!("Moved revoked certificate {:?} to {:?}", source, dest);
                    moved += 1;
                }
                Err(e) => {
                    warn!("Error moving revoked certificate {}: {}", cert.common_name, e);
                }
            }
        }

        if moved > 0 {
            info!("Moved {} revoked certificate(s) to {:?}", moved, info.revoked_dir);
        }
        moved
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "Rename {:?} -> {:?} failed ({}), copying instead",
                source, dest, rename_err
            );
            fs::copy(source, dest).map_err(|_| rename_err)?;
            fs::remove_file(source)
        }
    }
}
