//! Certificate and CSR models for easy-rsa PKI state

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Certificate status as recorded in the index file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    /// `V` - issued and not revoked
    Valid,
    /// `R` - revoked
    Revoked,
    /// `E` - marked expired by the CA tool
    Expired,
}

impl CertificateStatus {
    /// Map an index status character to a status
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'V' => Some(Self::Valid),
            'R' => Some(Self::Revoked),
            'E' => Some(Self::Expired),
            _ => None,
        }
    }

    /// Index file status character
    pub fn as_char(&self) -> char {
        match self {
            Self::Valid => 'V',
            Self::Revoked => 'R',
            Self::Expired => 'E',
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Valid => "VALID",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

impl FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valid" | "v" => Ok(Self::Valid),
            "revoked" | "r" => Ok(Self::Revoked),
            "expired" | "e" => Ok(Self::Expired),
            other => Err(format!("unknown certificate status: {}", other)),
        }
    }
}

/// Certificate purpose, also used as the `sign-req` type argument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    Ca,
    Server,
    Client,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ca" => Ok(Self::Ca),
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown certificate type: {}", other)),
        }
    }
}

/// One record of the CA tool's index file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    /// Status column
    pub status: CertificateStatus,
    /// Not valid after timestamp
    pub expires_at: DateTime<Utc>,
    /// Revocation timestamp (revoked records only)
    pub revoked_at: Option<DateTime<Utc>>,
    /// Serial number, verbatim (leading zeros and hex casing preserved)
    pub serial: String,
    /// Filename column (usually `unknown`)
    pub filename: String,
    /// Common name extracted from the subject DN
    pub common_name: String,
    /// Certificate purpose, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_type: Option<CertificateType>,
}

impl Certificate {
    /// Valid status and an expiry strictly after `now`.
    ///
    /// The index status is only refreshed when the CA tool runs, so a `V`
    /// record past its expiry is not considered valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CertificateStatus::Valid && self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whole days until expiration (negative once expired)
    pub fn days_until_expiration(&self) -> i64 {
        (self.expires_at - Utc::now()).num_days()
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "{} - {} ({} days left)",
                self.common_name,
                self.status,
                self.days_until_expiration()
            )
        } else {
            write!(f, "{} - {}", self.common_name, self.status)
        }
    }
}

/// Per-status certificate counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateCounts {
    pub total: usize,
    pub valid: usize,
    pub revoked: usize,
    pub expired: usize,
}

/// A pending signing request found in the `reqs` directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Request short name (file stem)
    pub name: String,
    /// Path to the `.req` file
    pub req_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CertificateRequest {
    pub fn new(name: impl Into<String>, req_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            req_file: req_file.into(),
            common_name: None,
            organization: None,
            email: None,
        }
    }
}

impl fmt::Display for CertificateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            self.common_name.as_deref().unwrap_or("unknown CN")
        )
    }
}

/// Fields extracted from certificate inspection output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_algorithm: Option<String>,
}

impl CertificateDetails {
    /// True when no field could be extracted
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
