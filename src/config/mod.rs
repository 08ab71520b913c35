//! Configuration management
//!
//! YAML configuration with environment variable overrides. The loaded
//! [`AppConfig`] is built once at startup and handed by reference to the
//! components that need it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "EASYRSA_MANAGER_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub easyrsa: EasyRsaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// easy-rsa installation and PKI location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EasyRsaConfig {
    /// Path to the easyrsa script
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    /// PKI root the script operates on
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,
    /// Hard limit for one easy-rsa invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// openssl binary used for read-only inspection
    #[serde(default = "default_openssl_binary")]
    pub openssl_binary: PathBuf,
    #[serde(default = "default_inspect_timeout_secs")]
    pub inspect_timeout_secs: u64,
    /// Passed to easy-rsa as `EASYRSA_VARS_FILE` when set
    #[serde(default)]
    pub vars_file: Option<PathBuf>,
}

impl EasyRsaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("/usr/share/easy-rsa/easyrsa")
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("/home/pi/easy-rsa-pki")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_openssl_binary() -> PathBuf {
    PathBuf::from("openssl")
}

fn default_inspect_timeout_secs() -> u64 {
    5
}

impl Default for EasyRsaConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            pki_dir: default_pki_dir(),
            timeout_secs: default_timeout_secs(),
            openssl_binary: default_openssl_binary(),
            inspect_timeout_secs: default_inspect_timeout_secs(),
            vars_file: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Rotate the log file daily instead of never
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to the console (stderr)
    #[default]
    Console,
    /// Log to a file, optionally rotated
    File,
    /// Log to both console and file
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/easyrsa-manager")
}

fn default_log_prefix() -> String {
    "easyrsa-manager".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with EASYRSA_MANAGER_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::read_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load one explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            // System config directory
            PathBuf::from("/etc/easyrsa-manager/config.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("easyrsa-manager/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.is_file())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // easy-rsa overrides
        if let Ok(dir) = std::env::var("EASYRSA_MANAGER_PKI_DIR") {
            self.easyrsa.pki_dir = PathBuf::from(dir);
        }
        if let Ok(bin) = std::env::var("EASYRSA_MANAGER_EASYRSA_BIN") {
            self.easyrsa.binary_path = PathBuf::from(bin);
        }
        if let Ok(secs) = std::env::var("EASYRSA_MANAGER_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.easyrsa.timeout_secs = secs;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("EASYRSA_MANAGER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EASYRSA_MANAGER_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(target) = std::env::var("EASYRSA_MANAGER_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Ok(dir) = std::env::var("EASYRSA_MANAGER_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.easyrsa.timeout_secs == 0 {
            anyhow::bail!("easy-rsa timeout cannot be 0");
        }
        if self.easyrsa.binary_path.as_os_str().is_empty() {
            anyhow::bail!("easy-rsa binary path cannot be empty");
        }
        if self.easyrsa.pki_dir.as_os_str().is_empty() {
            anyhow::bail!("PKI directory cannot be empty");
        }
        if self.easyrsa.inspect_timeout_secs == 0 {
            anyhow::bail!("Inspection timeout cannot be 0");
        }

        if !self.easyrsa.binary_path.exists() {
            tracing::warn!(
                "easy-rsa binary does not exist: {:?}. CA operations will fail.",
                self.easyrsa.binary_path
            );
        }

        Ok(())
    }
}
