//! Parsers for easy-rsa state files and tool output
//!
//! Covers the OpenSSL-style `index.txt` ledger, subject DN strings,
//! certificate inspection text and easy-rsa diagnostics. Everything here is
//! best-effort: malformed input is skipped or reported as absent, never fatal.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::models::{
    Certificate, CertificateDetails, CertificateRequest, CertificateStatus, CertificateType,
};

/// Returned by [`parse_error_message`] for empty diagnostics
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Most lines kept by [`parse_error_message`]
const MAX_ERROR_LINES: usize = 3;

/// Raw diagnostics fallback length, in characters
const MAX_RAW_ERROR_CHARS: usize = 200;

static SLASH_CN: Lazy<Regex> = Lazy::new(|| Regex::new(r"/CN=([^/]+)").unwrap());
static COMMA_CN: Lazy<Regex> = Lazy::new(|| Regex::new(r"CN\s*=\s*([^,]+)").unwrap());

static SUBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*Subject:[ \t]*(.+?)\s*$").unwrap());
static ISSUER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*Issuer:[ \t]*(.+?)\s*$").unwrap());
static NOT_BEFORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Not Before[ \t]*:[ \t]*(.+?)\s*$").unwrap());
static NOT_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Not After[ \t]*:[ \t]*(.+?)\s*$").unwrap());
// The serial is printed on the following line when it is long
static SERIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Serial Number:\s*([0-9a-fA-F:]+)").unwrap());
static KEY_ALGORITHM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Public Key Algorithm:[ \t]*(.+?)\s*$").unwrap());

/// Why a single index line produced no certificate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexLineError {
    /// Empty or comment line
    #[error("blank or comment line")]
    Blank,

    #[error("expected at least 5 tab-separated fields, found {0}")]
    TooFewFields(usize),

    #[error("unknown status '{0}'")]
    UnknownStatus(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Parse an index timestamp: `YYMMDDHHMMSSZ` (UTCTime) or `YYYYMMDDHHMMSSZ`
/// (GeneralizedTime, written by OpenSSL for dates from 2050 on).
pub fn parse_index_timestamp(raw: &str) -> Result<DateTime<Utc>, IndexLineError> {
    let invalid = || IndexLineError::InvalidTimestamp(raw.to_string());

    let digits = raw
        .strip_suffix('Z')
        .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(invalid)?;

    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

    let (year, rest) = match digits.len() {
        12 => {
            // X.509 UTCTime pivot
            let yy = number(&digits[..2])? as i32;
            (if yy >= 50 { 1900 + yy } else { 2000 + yy }, &digits[2..])
        }
        14 => (number(&digits[..4])? as i32, &digits[4..]),
        _ => return Err(invalid()),
    };

    let naive = NaiveDate::from_ymd_opt(year, number(&rest[0..2])?, number(&rest[2..4])?)
        .and_then(|date| {
            date.and_hms_opt(
                number(&rest[4..6]).ok()?,
                number(&rest[6..8]).ok()?,
                number(&rest[8..10]).ok()?,
            )
        })
        .ok_or_else(invalid)?;

    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse one index record: `status \t expiry \t revocation \t serial \t filename \t DN`
pub fn try_parse_line(line: &str) -> Result<Certificate, IndexLineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(IndexLineError::Blank);
    }

    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 5 {
        return Err(IndexLineError::TooFewFields(parts.len()));
    }

    let mut status_chars = parts[0].chars();
    let status = match (status_chars.next(), status_chars.next()) {
        (Some(c), None) => CertificateStatus::from_char(c),
        _ => None,
    }
    .ok_or_else(|| IndexLineError::UnknownStatus(parts[0].to_string()))?;

    let expires_at = parse_index_timestamp(parts[1])?;
    // OpenSSL may append the reason: `YYMMDDHHMMSSZ,keyCompromise`
    let revoked_at = match parts[2].split(',').next().unwrap_or("") {
        "" => None,
        raw => Some(parse_index_timestamp(raw)?),
    };

    let dn = parts.get(5).copied().unwrap_or("");

    Ok(Certificate {
        status,
        expires_at,
        revoked_at,
        serial: parts[3].to_string(),
        filename: parts[4].to_string(),
        common_name: extract_cn_from_dn(dn),
        cert_type: None,
    })
}

/// Parse one index line, `None` when it should be skipped
pub fn parse_line(line: &str) -> Option<Certificate> {
    try_parse_line(line).ok()
}

/// Parse index file contents, skipping lines that do not parse
pub fn parse_index(content: &str) -> Vec<Certificate> {
    content
        .lines()
        .enumerate()
        .filter_map(|(number, line)| match try_parse_line(line) {
            Ok(cert) => Some(cert),
            Err(IndexLineError::Blank) => None,
            Err(e) => {
                debug!("Skipping index line {}: {}", number + 1, e);
                None
            }
        })
        .collect()
}

/// Read and parse an index file. A missing or unreadable file yields no records.
pub fn parse_index_file(path: &Path) -> Vec<Certificate> {
    match std::fs::read(path) {
        Ok(bytes) => parse_index(&String::from_utf8_lossy(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!("Failed to read index file {:?}: {}", path, e);
            Vec::new()
        }
    }
}

/// Extract the common name from a DN in `/CN=x/O=y` or `CN = x, O = y` form.
/// Returns an empty string when there is no CN.
pub fn extract_cn_from_dn(dn: &str) -> String {
    if let Some(caps) = SLASH_CN.captures(dn) {
        return caps[1].to_string();
    }
    if let Some(caps) = COMMA_CN.captures(dn) {
        return caps[1].trim().to_string();
    }
    String::new()
}

/// Extract any DN attribute (`O`, `emailAddress`, ...) using the same two conventions
pub fn extract_dn_attribute(dn: &str, attribute: &str) -> Option<String> {
    if attribute == "CN" {
        return Some(extract_cn_from_dn(dn)).filter(|cn| !cn.is_empty());
    }

    let name = regex::escape(attribute);
    let slash = Regex::new(&format!(r"/{}=([^/]+)", name)).ok()?;
    if let Some(caps) = slash.captures(dn) {
        return Some(caps[1].to_string());
    }

    let comma = Regex::new(&format!(r"(?:^|,)\s*{}\s*=\s*([^,]+)", name)).ok()?;
    comma
        .captures(dn)
        .map(|caps| caps[1].trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Fill request subject fields from `openssl req -subject` style text
pub fn apply_request_subject(mut request: CertificateRequest, subject: &str) -> CertificateRequest {
    let dn = subject.trim().trim_start_matches("subject=").trim();
    request.common_name = extract_dn_attribute(dn, "CN");
    request.organization = extract_dn_attribute(dn, "O");
    request.email = extract_dn_attribute(dn, "emailAddress");
    request
}

/// Extract the interesting fields from certificate inspection output
/// (`easyrsa show-cert`, `openssl x509 -text`). Missing fields stay `None`.
pub fn parse_cert_details(output: &str) -> CertificateDetails {
    let capture = |re: &Regex| {
        re.captures(output)
            .map(|caps| caps[1].trim().to_string())
            .filter(|value| !value.is_empty())
    };

    CertificateDetails {
        subject: capture(&SUBJECT),
        issuer: capture(&ISSUER),
        not_before: capture(&NOT_BEFORE),
        not_after: capture(&NOT_AFTER),
        serial: capture(&SERIAL),
        key_algorithm: capture(&KEY_ALGORITHM),
    }
}

/// File-name heuristic: `ca`, then `server`, then `client`.
///
/// First match wins, so a name that merely contains `ca` (`scanner-01.crt`)
/// is classified as a CA.
pub fn classify_filename(path: &Path) -> Option<CertificateType> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();

    if name.contains("ca") {
        Some(CertificateType::Ca)
    } else if name.contains("server") {
        Some(CertificateType::Server)
    } else if name.contains("client") {
        Some(CertificateType::Client)
    } else {
        None
    }
}

/// Classify from keyUsage / extendedKeyUsage text
pub fn classify_extensions(text: &str) -> Option<CertificateType> {
    let text = text.to_lowercase();

    if text.contains("tls web server") {
        Some(CertificateType::Server)
    } else if text.contains("tls web client") {
        Some(CertificateType::Client)
    } else if text.contains("certificate sign") {
        Some(CertificateType::Ca)
    } else {
        None
    }
}

/// Best-effort certificate type detection.
///
/// Uses the file name first and only inspects the certificate extensions with
/// `openssl` when the name is inconclusive. Falls back to `Client`.
pub async fn detect_cert_type(path: &Path, openssl: &Path, limit: Duration) -> CertificateType {
    if let Some(cert_type) = classify_filename(path) {
        return cert_type;
    }

    let args = [
        OsStr::new("x509"),
        OsStr::new("-in"),
        path.as_os_str(),
        OsStr::new("-noout"),
        OsStr::new("-ext"),
        OsStr::new("keyUsage,extendedKeyUsage"),
    ];

    match run_inspection(openssl, &args, limit).await {
        Some(stdout) => classify_extensions(&stdout).unwrap_or(CertificateType::Client),
        None => CertificateType::Client,
    }
}

/// Read the subject line of a request file with `openssl req`
pub async fn inspect_request_subject(path: &Path, openssl: &Path, limit: Duration) -> Option<String> {
    let args = [
        OsStr::new("req"),
        OsStr::new("-in"),
        path.as_os_str(),
        OsStr::new("-noout"),
        OsStr::new("-subject"),
    ];

    run_inspection(openssl, &args, limit)
        .await
        .map(|stdout| stdout.trim().to_string())
        .filter(|subject| !subject.is_empty())
}

/// Run a read-only inspection command, returning stdout on success
async fn run_inspection(
    program: &Path,
    args: &[&OsStr],
    limit: Duration,
) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match timeout(limit, output).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(
                "{:?} exited with {:?}: {}",
                program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Ok(Err(e)) => {
            debug!("Failed to run {:?}: {}", program, e);
            None
        }
        Err(_) => {
            debug!("{:?} did not finish within {:?}", program, limit);
            None
        }
    }
}

/// Reduce raw easy-rsa diagnostics to at most three user-facing lines.
///
/// Lines starting with `[` or `*` are tool noise. Lines mentioning "error" or
/// "failed" win; otherwise the first non-empty lines are used.
pub fn parse_error_message(stderr: &str) -> String {
    if stderr.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }

    let non_empty: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let meaningful: Vec<&str> = non_empty
        .iter()
        .copied()
        .filter(|line| !line.starts_with('[') && !line.starts_with('*'))
        .collect();

    let errors: Vec<&str> = meaningful
        .iter()
        .copied()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") || lower.contains("failed")
        })
        .take(MAX_ERROR_LINES)
        .collect();

    if !errors.is_empty() {
        return errors.join("\n");
    }

    for lines in [&meaningful, &non_empty] {
        if !lines.is_empty() {
            return lines[..lines.len().min(MAX_ERROR_LINES)].join("\n");
        }
    }

    stderr.chars().take(MAX_RAW_ERROR_CHARS).collect()
}
