//! CA operations
//!
//! Every easy-rsa action this crate can perform is one [`CaOperation`]
//! variant carrying its own arguments. [`OperationRunner`] is the workflow
//! around a single operation: validate, check the PKI state, run it, then
//! report which files it left behind.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{CertificateArtifacts, CertificateType, CommandResult};
use crate::services::command_runner::{CommandRunner, ENV_REQ_CN};
use crate::services::pki_store::PkiStore;
use crate::utils::validation::{
    validate_certificate_name, validate_common_name, validate_file_path,
};
use crate::utils::{AppError, AppResult};

const NOPASS: &str = "nopass";

/// A single easy-rsa action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum CaOperation {
    InitPki,
    BuildCa {
        common_name: Option<String>,
        nopass: bool,
    },
    BuildServerFull {
        name: String,
        nopass: bool,
    },
    BuildClientFull {
        name: String,
        nopass: bool,
    },
    /// Generate a key and an unsigned request
    GenReq {
        name: String,
        nopass: bool,
    },
    /// Import an external request under a short name
    ImportReq {
        req_file: PathBuf,
        short_name: String,
    },
    SignReq {
        cert_type: CertificateType,
        name: String,
    },
    /// `reason` is recorded in the log only; easy-rsa is not given it
    Revoke {
        name: String,
        reason: Option<String>,
    },
    GenCrl,
    ShowCert {
        name: String,
    },
}

impl CaOperation {
    /// easy-rsa subcommand
    pub fn label(&self) -> &'static str {
        match self {
            CaOperation::InitPki => "init-pki",
            CaOperation::BuildCa { .. } => "build-ca",
            CaOperation::BuildServerFull { .. } => "build-server-full",
            CaOperation::BuildClientFull { .. } => "build-client-full",
            CaOperation::GenReq { .. } => "gen-req",
            CaOperation::ImportReq { .. } => "import-req",
            CaOperation::SignReq { .. } => "sign-req",
            CaOperation::Revoke { .. } => "revoke",
            CaOperation::GenCrl => "gen-crl",
            CaOperation::ShowCert { .. } => "show-cert",
        }
    }

    /// Positional arguments, subcommand first
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.label().to_string()];
        match self {
            CaOperation::InitPki | CaOperation::GenCrl => {}
            CaOperation::BuildCa { nopass, .. } => {
                if *nopass {
                    args.push(NOPASS.to_string());
                }
            }
            CaOperation::BuildServerFull { name, nopass }
            | CaOperation::BuildClientFull { name, nopass }
            | CaOperation::GenReq { name, nopass } => {
                args.push(name.clone());
                if *nopass {
                    args.push(NOPASS.to_string());
                }
            }
            CaOperation::ImportReq {
                req_file,
                short_name,
            } => {
                args.push(req_file.to_string_lossy().into_owned());
                args.push(short_name.clone());
            }
            CaOperation::SignReq { cert_type, name } => {
                args.push(cert_type.as_str().to_string());
                args.push(name.clone());
            }
            CaOperation::Revoke { name, .. } | CaOperation::ShowCert { name } => {
                args.push(name.clone());
            }
        }
        args
    }

    /// Variables added to the ambient environment for this operation
    pub fn extra_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let CaOperation::BuildCa {
            common_name: Some(cn),
            ..
        } = self
        {
            env.insert(ENV_REQ_CN.to_string(), cn.clone());
        }
        env
    }

    /// False only for read-only inspection
    pub fn is_mutating(&self) -> bool {
        !matches!(self, CaOperation::ShowCert { .. })
    }

    /// Entity name the operation creates or acts on
    pub fn target_name(&self) -> Option<&str> {
        match self {
            CaOperation::InitPki | CaOperation::GenCrl | CaOperation::BuildCa { .. } => None,
            CaOperation::BuildServerFull { name, .. }
            | CaOperation::BuildClientFull { name, .. }
            | CaOperation::GenReq { name, .. }
            | CaOperation::SignReq { name, .. }
            | CaOperation::Revoke { name, .. }
            | CaOperation::ShowCert { name } => Some(name.as_str()),
            CaOperation::ImportReq { short_name, .. } => Some(short_name.as_str()),
        }
    }

    /// Check names before anything is handed to easy-rsa
    pub fn validate(&self) -> AppResult<()> {
        match self {
            CaOperation::InitPki | CaOperation::GenCrl => Ok(()),
            CaOperation::BuildCa { common_name, .. } => match common_name {
                Some(cn) => validate_common_name(cn),
                None => Ok(()),
            },
            CaOperation::ImportReq {
                req_file,
                short_name,
            } => {
                validate_file_path(&req_file.to_string_lossy(), false)?;
                validate_certificate_name(short_name)
            }
            CaOperation::BuildServerFull { name, .. }
            | CaOperation::BuildClientFull { name, .. }
            | CaOperation::GenReq { name, .. }
            | CaOperation::SignReq { name, .. }
            | CaOperation::Revoke { name, .. }
            | CaOperation::ShowCert { name } => validate_certificate_name(name),
        }
    }
}

impl fmt::Display for CaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_name() {
            Some(name) => write!(f, "{} {}", self.label(), name),
            None => f.write_str(self.label()),
        }
    }
}

/// Outcome of one operation run through [`OperationRunner`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationReport {
    pub operation: CaOperation,
    pub result: CommandResult,
    /// Files present for the target name after a successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<CertificateArtifacts>,
}

impl OperationReport {
    pub fn success(&self) -> bool {
        self.result.success
    }
}

/// Runs operations against one PKI, checking its state first
pub struct OperationRunner<'a> {
    runner: &'a CommandRunner,
    store: &'a PkiStore,
}

impl<'a> OperationRunner<'a> {
    pub fn new(runner: &'a CommandRunner, store: &'a PkiStore) -> Self {
        Self { runner, store }
    }

    /// Validate, pre-check, execute and collect artifacts
    pub async fn dispatch(&self, operation: CaOperation) -> OperationReport {
        if let Err(e) = operation.validate() {
            warn!("Rejected {}: {}", operation, e);
            return self.rejected(operation, e);
        }
        if self.runner.pki_dir() != self.store.pki_dir() {
            let e = AppError::Config(format!(
                "Runner targets {} but the store reads {}",
                self.runner.pki_dir().display(),
                self.store.pki_dir().display()
            ));
            warn!("Refusing {}: {}", operation, e);
            return self.rejected(operation, e);
        }
        if let Err(e) = self.precheck(&operation) {
            warn!("Refusing {}: {}", operation, e);
            return self.rejected(operation, e);
        }

        let result = self.runner.execute(&operation).await;
        info!(
            "{} finished: success={}, exit_code={}",
            operation, result.success, result.exit_code
        );

        let artifacts = match operation.target_name() {
            Some(name) if result.success && operation.is_mutating() => {
                Some(self.store.certificate_artifacts(name))
            }
            _ => None,
        };

        OperationReport {
            operation,
            result,
            artifacts,
        }
    }

    fn precheck(&self, operation: &CaOperation) -> AppResult<()> {
        match operation {
            CaOperation::BuildServerFull { name, .. }
            | CaOperation::BuildClientFull { name, .. }
            | CaOperation::GenReq { name, .. } => {
                if self.store.get_certificate_by_name(name).is_some() {
                    return Err(AppError::BadRequest(format!(
                        "Certificate '{}' already exists",
                        name
                    )));
                }
                Ok(())
            }
            CaOperation::ImportReq { req_file, .. } => {
                if !req_file.is_file() {
                    return Err(AppError::NotFound(format!(
                        "Request file {}",
                        req_file.display()
                    )));
                }
                Ok(())
            }
            CaOperation::SignReq { name, .. } => {
                if self.store.get_request_path(name).is_none() {
                    return Err(AppError::NotFound(format!("Request '{}'", name)));
                }
                Ok(())
            }
            CaOperation::InitPki
            | CaOperation::BuildCa { .. }
            | CaOperation::Revoke { .. }
            | CaOperation::GenCrl
            | CaOperation::ShowCert { .. } => Ok(()),
        }
    }

    fn rejected(&self, operation: CaOperation, error: AppError) -> OperationReport {
        OperationReport {
            operation,
            result: CommandResult::failed(error.kind(), error.to_string()),
            artifacts: None,
        }
    }
}
