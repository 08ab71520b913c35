//! easy-rsa command runner
//!
//! Executes the easy-rsa script against one PKI directory. Every invocation
//! gets its own environment overlay (`EASYRSA_PKI`, `EASYRSA_BATCH`, ...) on
//! top of the inherited environment; the host process environment is never
//! modified. Failures of any kind come back as a failed [`CommandResult`].

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use crate::config::EasyRsaConfig;
use crate::models::{CertificateType, CommandResult, NO_EXIT_CODE};
use crate::services::operations::CaOperation;
use crate::services::parser::parse_error_message;

/// Hard limit for a single easy-rsa invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// PKI directory the script operates on
pub const ENV_PKI: &str = "EASYRSA_PKI";
/// Disables interactive prompts
pub const ENV_BATCH: &str = "EASYRSA_BATCH";
/// Common name used by `build-ca`
pub const ENV_REQ_CN: &str = "EASYRSA_REQ_CN";
/// Alternate vars file
pub const ENV_VARS_FILE: &str = "EASYRSA_VARS_FILE";

/// Ways an invocation can fail before producing an exit code
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("easy-rsa binary not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Command timed out")]
    Timeout(Duration),

    #[error("{0}")]
    Spawn(#[source] std::io::Error),
}

impl ToolError {
    /// Convert into the failed outcome reported to callers
    pub fn into_result(self) -> CommandResult {
        let message = match &self {
            ToolError::NotFound(path) => format!("Could not find easy-rsa at {}", path.display()),
            ToolError::Timeout(after) => format!(
                "Command execution timed out after {}",
                describe_duration(*after)
            ),
            ToolError::Spawn(e) => format!("Error running command: {}", e),
        };
        CommandResult::failed(self.to_string(), message)
    }
}

fn describe_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{} seconds", duration.as_secs())
    } else {
        format!("{} ms", duration.as_millis())
    }
}

/// Runs easy-rsa subcommands for a single PKI directory
#[derive(Debug, Clone)]
pub struct CommandRunner {
    binary_path: PathBuf,
    pki_dir: PathBuf,
    timeout: Duration,
    vars_file: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(binary_path: impl Into<PathBuf>, pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            pki_dir: pki_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            vars_file: None,
        }
    }

    /// Create a runner from configuration
    pub fn from_config(config: &EasyRsaConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            pki_dir: config.pki_dir.clone(),
            timeout: config.timeout(),
            vars_file: config.vars_file.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_vars_file(mut self, vars_file: impl Into<PathBuf>) -> Self {
        self.vars_file = Some(vars_file.into());
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the configured binary exists
    pub fn check_availability(&self) -> bool {
        let available = self.binary_path.is_file();
        if !available {
            warn!("easy-rsa binary not found at {:?}", self.binary_path);
        }
        available
    }

    /// Environment overlay for one invocation: ambient variables, then `extra`
    pub fn ambient_env(&self, extra: Option<&HashMap<String, String>>) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_PKI.to_string(), self.pki_dir.to_string_lossy().into_owned());
        env.insert(ENV_BATCH.to_string(), "1".to_string());
        if let Some(vars_file) = &self.vars_file {
            env.insert(
                ENV_VARS_FILE.to_string(),
                vars_file.to_string_lossy().into_owned(),
            );
        }
        if let Some(extra) = extra {
            env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }

    /// Run `easyrsa <args>` and report the outcome. Never retries.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        extra_env: Option<&HashMap<String, String>>,
    ) -> CommandResult {
        let command_str = format!(
            "{} {}",
            self.binary_path.display(),
            args.iter()
                .map(|a| a.as_ref().to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let env = self.ambient_env(extra_env);

        info!("Executing easy-rsa command as {}: {}", current_user(), command_str);
        debug!("easy-rsa environment overlay: {:?}", env);

        let start = Instant::now();
        let outcome = self.spawn_and_wait(args, &env).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok((stdout, stderr, status)) => {
                let result = self.classify_exit(stdout, stderr, status);
                if result.success {
                    info!(
                        "easy-rsa command succeeded in {}ms: {}",
                        duration_ms, command_str
                    );
                } else {
                    error!(
                        "easy-rsa command FAILED: exit_code={}, command='{}'",
                        result.exit_code, command_str
                    );
                    debug!("easy-rsa stdout:\n{}", result.stdout);
                    debug!("easy-rsa stderr:\n{}", result.stderr);
                }
                result
            }
            Err(e) => {
                error!("easy-rsa command error: command='{}', error='{}'", command_str, e);
                e.into_result()
            }
        }
    }

    async fn spawn_and_wait<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        env: &BTreeMap<String, String>,
    ) -> Result<(String, String, ExitStatus), ToolError> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(self.binary_path.clone()),
            _ => ToolError::Spawn(e),
        })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            ToolError::Spawn(std::io::Error::other("stdout was not captured"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            ToolError::Spawn(std::io::Error::other("stderr was not captured"))
        })?;

        let result = timeout(self.timeout, async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();

            let (stdout_result, stderr_result, status) = tokio::join!(
                stdout.read_to_end(&mut stdout_buf),
                stderr.read_to_end(&mut stderr_buf),
                child.wait()
            );

            if let Err(e) = stdout_result.and(stderr_result) {
                warn!("Failed to read easy-rsa output: {}", e);
            }
            let status = status.map_err(ToolError::Spawn)?;

            Ok::<_, ToolError>((
                String::from_utf8_lossy(&stdout_buf).into_owned(),
                String::from_utf8_lossy(&stderr_buf).into_owned(),
                status,
            ))
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    "easy-rsa command TIMEOUT after {}",
                    describe_duration(self.timeout)
                );
                // The index or serial file may already be partially written
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out easy-rsa process: {}", e);
                }
                Err(ToolError::Timeout(self.timeout))
            }
        }
    }

    fn classify_exit(&self, stdout: String, stderr: String, status: ExitStatus) -> CommandResult {
        if status.success() {
            return CommandResult::succeeded(stdout, stderr);
        }

        #[cfg(unix)]
        let signal = status.signal();
        #[cfg(not(unix))]
        let signal: Option<i32> = None;

        let mut message = if stderr.trim().is_empty() {
            parse_error_message(stdout.trim())
        } else {
            parse_error_message(&stderr)
        };
        if let Some(signal) = signal {
            message = format!("Process terminated by signal {}\n{}", signal, message);
        }

        CommandResult {
            success: false,
            exit_code: status.code().unwrap_or(NO_EXIT_CODE),
            stdout,
            stderr,
            message: Some(message),
        }
    }

    /// Execute one operation
    pub async fn execute(&self, operation: &CaOperation) -> CommandResult {
        if let CaOperation::Revoke {
            name,
            reason: Some(reason),
        } = operation
        {
            info!("Revoking {} (reason: {})", name, reason);
        }

        let env = operation.extra_env();
        let extra = if env.is_empty() { None } else { Some(&env) };
        self.run(&operation.args(), extra).await
    }

    /// `init-pki`
    pub async fn init_pki(&self) -> CommandResult {
        self.execute(&CaOperation::InitPki).await
    }

    /// `build-ca [nopass]`, CN passed through `EASYRSA_REQ_CN`
    pub async fn build_ca(&self, common_name: Option<&str>, nopass: bool) -> CommandResult {
        self.execute(&CaOperation::BuildCa {
            common_name: common_name.map(String::from),
            nopass,
        })
        .await
    }

    /// `build-server-full <name> [nopass]`
    pub async fn build_server_full(&self, name: &str, nopass: bool) -> CommandResult {
        self.execute(&CaOperation::BuildServerFull {
            name: name.to_string(),
            nopass,
        })
        .await
    }

    /// `build-client-full <name> [nopass]`
    pub async fn build_client_full(&self, name: &str, nopass: bool) -> CommandResult {
        self.execute(&CaOperation::BuildClientFull {
            name: name.to_string(),
            nopass,
        })
        .await
    }

    /// `gen-req <name> [nopass]`
    pub async fn gen_req(&self, name: &str, nopass: bool) -> CommandResult {
        self.execute(&CaOperation::GenReq {
            name: name.to_string(),
            nopass,
        })
        .await
    }

    /// `import-req <file> <short name>`
    pub async fn import_req(&self, req_file: &Path, short_name: &str) -> CommandResult {
        self.execute(&CaOperation::ImportReq {
            req_file: req_file.to_path_buf(),
            short_name: short_name.to_string(),
        })
        .await
    }

    /// `sign-req <type> <name>`
    pub async fn sign_req(&self, cert_type: CertificateType, name: &str) -> CommandResult {
        self.execute(&CaOperation::SignReq {
            cert_type,
            name: name.to_string(),
        })
        .await
    }

    /// `revoke <name>`
    pub async fn revoke(&self, name: &str, reason: Option<&str>) -> CommandResult {
        self.execute(&CaOperation::Revoke {
            name: name.to_string(),
            reason: reason.map(String::from),
        })
        .await
    }

    /// `gen-crl`
    pub async fn gen_crl(&self) -> CommandResult {
        self.execute(&CaOperation::GenCrl).await
    }

    /// `show-cert <name>`
    pub async fn show_cert(&self, name: &str) -> CommandResult {
        self.execute(&CaOperation::ShowCert {
            name: name.to_string(),
        })
        .await
    }
}

#[cfg(unix)]
fn current_user() -> String {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    let username = std::env::var("USER").unwrap_or_else(|_| format!("uid:{}", uid));
    format!("user '{}' (uid={}, gid={})", username, uid, gid)
}

#[cfg(not(unix))]
fn current_user() -> String {
    std::env::var("USERNAME").unwrap_or_else(|_| "unknown user".to_string())
}

/// Parse an easy-rsa vars file.
///
/// Understands `set_var NAME "VALUE"` and `export NAME=VALUE`; quotes are
/// stripped and every other line is ignored.
pub fn parse_vars(content: &str) -> HashMap<String, String> {
    let strip_quotes = |value: &str| {
        value
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'')
            .to_string()
    };

    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("set_var ") {
            if let Some((name, value)) = rest.trim_start().split_once(char::is_whitespace) {
                vars.insert(name.to_string(), strip_quotes(value));
            }
        } else if let Some(rest) = line.strip_prefix("export ") {
            if let Some((name, value)) = rest.split_once('=') {
                vars.insert(name.trim().to_string(), strip_quotes(value));
            }
        }
    }
    vars
}

/// Load a vars file. A missing file yields an empty map.
pub fn set_vars(path: &Path) -> HashMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_vars(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
        Err(e) => {
            warn!("Error loading vars file {:?}: {}", path, e);
            HashMap::new()
        }
    }
}
