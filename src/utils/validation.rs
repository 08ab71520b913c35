//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::{AppError, AppResult};

/// Certificate names become file names under the PKI directory
static CERTNAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap());

static COMMON_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9 ._-]+$").unwrap());

fn invalid(message: impl Into<String>) -> AppError {
    AppError::ValidationError(message.into())
}

/// Validate a certificate (file) name
pub fn validate_certificate_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(invalid("Certificate name cannot be empty"));
    }
    if name.chars().count() > 64 {
        return Err(invalid("Certificate name too long (max 64 characters)"));
    }
    if !CERTNAME_REGEX.is_match(name) {
        return Err(invalid(
            "Certificate name can only contain letters, numbers, dots, hyphens, and underscores",
        ));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("Certificate name cannot start with dot or hyphen"));
    }
    Ok(())
}

/// Validate a subject common name
pub fn validate_common_name(cn: &str) -> AppResult<()> {
    if cn.is_empty() {
        return Err(invalid("Common name cannot be empty"));
    }
    if cn.chars().count() > 64 {
        return Err(invalid("Common name too long (max 64 characters)"));
    }
    if !COMMON_NAME_REGEX.is_match(cn) {
        return Err(invalid("Common name contains invalid characters"));
    }
    Ok(())
}

/// Validate a user-supplied file path
pub fn validate_file_path(path: &str, must_exist: bool) -> AppResult<()> {
    if path.is_empty() {
        return Err(invalid("Path cannot be empty"));
    }
    if must_exist && !std::path::Path::new(path).exists() {
        return Err(invalid("File does not exist"));
    }
    if path.contains("..") {
        return Err(invalid("Path cannot contain \"..\""));
    }
    Ok(())
}
