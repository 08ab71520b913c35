//! Test fixtures for PKI trees and a scripted easy-rsa stand-in

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use easyrsa_manager::services::{CommandRunner, PkiStore};

/// Format a timestamp the way the index file stores it
pub fn index_time(at: DateTime<Utc>) -> String {
    at.format("%y%m%d%H%M%SZ").to_string()
}

/// One index record for `cn`
pub fn index_line(status: char, expires_in_days: i64, serial: &str, cn: &str) -> String {
    let now = Utc::now();
    let revoked = if status == 'R' {
        index_time(now - Duration::days(1))
    } else {
        String::new()
    };
    format!(
        "{}\t{}\t{}\t{}\tunknown\t/CN={}/O=Test",
        status,
        index_time(now + Duration::days(expires_in_days)),
        revoked,
        serial,
        cn
    )
}

/// Temporary easy-rsa PKI directory
#[derive(Debug)]
pub struct PkiFixture {
    dir: TempDir,
}

impl PkiFixture {
    /// Initialized PKI (directories plus an empty index), no CA
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp PKI dir");
        for sub in ["issued", "private", "reqs"] {
            fs::create_dir_all(dir.path().join(sub)).expect("create PKI subdir");
        }
        fs::write(dir.path().join("index.txt"), "").expect("write index");
        fs::write(dir.path().join("serial"), "01\n").expect("write serial");
        Self { dir }
    }

    /// Directory with nothing in it
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp PKI dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn with_ca(self) -> Self {
        fs::write(self.path().join("ca.crt"), "CA CERT").expect("write ca.crt");
        fs::write(self.path().join("private/ca.key"), "CA KEY").expect("write ca.key");
        self
    }

    pub fn with_index(self, lines: &[String]) -> Self {
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(self.path().join("index.txt"), content).expect("write index");
        self
    }

    pub fn with_issued(self, name: &str) -> Self {
        fs::write(self.path().join(format!("issued/{}.crt", name)), name).expect("write cert");
        fs::write(self.path().join(format!("private/{}.key", name)), name).expect("write key");
        self
    }

    pub fn with_request(self, name: &str) -> Self {
        fs::write(self.path().join(format!("reqs/{}.req", name)), name).expect("write req");
        self
    }

    pub fn store(&self) -> PkiStore {
        PkiStore::new(self.path())
    }

    /// Runner backed by [`fake_easyrsa`]
    #[cfg(unix)]
    pub fn runner(&self) -> CommandRunner {
        CommandRunner::new(fake_easyrsa(), self.path())
    }
}

impl Default for PkiFixture {
    fn default() -> Self {
        Self::new()
    }
}

const FAKE_EASYRSA: &str = r#"#!/bin/sh
echo "args: $*"
echo "pki=$EASYRSA_PKI batch=$EASYRSA_BATCH cn=${EASYRSA_REQ_CN:-}"
case "$1" in
  build-server-full|build-client-full)
    mkdir -p "$EASYRSA_PKI/issued" "$EASYRSA_PKI/private"
    echo cert > "$EASYRSA_PKI/issued/$2.crt"
    echo key > "$EASYRSA_PKI/private/$2.key"
    printf 'V\t350101000000Z\t\t0F\tunknown\t/CN=%s\n' "$2" >> "$EASYRSA_PKI/index.txt"
    ;;
  sign-req)
    if [ ! -f "$EASYRSA_PKI/reqs/$3.req" ]; then
      echo "[easyrsa] checking request" >&2
      echo "Easy-RSA error: No request found for $3" >&2
      exit 1
    fi
    echo cert > "$EASYRSA_PKI/issued/$3.crt"
    ;;
  show-cert)
    echo "Certificate:"
    echo "    Serial Number: 0F"
    echo "    Subject: CN=$2"
    ;;
  revoke)
    echo "[easyrsa] revoking" >&2
    echo "Easy-RSA error: Unable to revoke as no certificate was found" >&2
    exit 1
    ;;
  gen-crl)
    sleep 5
    ;;
esac
exit 0
"#;

/// Path of a shell script that imitates easy-rsa closely enough for tests.
///
/// Written once per test binary so no test executes a file another thread
/// still has open for writing.
#[cfg(unix)]
pub fn fake_easyrsa() -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::OnceLock;

    static SCRIPT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = SCRIPT.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create script dir");
        let path = dir.path().join("easyrsa");
        fs::write(&path, FAKE_EASYRSA).expect("write fake easyrsa");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake easyrsa");
        (dir, path)
    });
    path.clone()
}
