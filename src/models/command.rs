//! Outcome of a single CA tool invocation

use serde::{Deserialize, Serialize};

/// Exit code recorded when the process never produced one
pub const NO_EXIT_CODE: i32 = -1;

/// Result of running the CA tool. Failures are values, not errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Simplified, user-facing message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: 0,
            message: None,
        }
    }

    /// A failure that never reached a process exit (timeout, spawn error, rejected input)
    pub fn failed(stderr: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: NO_EXIT_CODE,
            message: Some(message.into()),
        }
    }

    /// stdout, stderr and message joined by newlines, empty parts skipped
    pub fn output(&self) -> String {
        [
            self.stdout.as_str(),
            self.stderr.as_str(),
            self.message.as_deref().unwrap_or(""),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Short text for display: the simplified message, else the raw diagnostics
    pub fn summary(&self) -> String {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return message.to_string();
        }
        let raw = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if raw.is_empty() {
            let fallback = if self.success { "OK" } else { "Unknown error" };
            fallback.to_string()
        } else {
            raw.chars().take(200).collect()
        }
    }
}
