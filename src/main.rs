//! easy-rsa manager command line
//!
//! Inspects an easy-rsa PKI and runs one CA operation per invocation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use easyrsa_manager::{
    config::{self, AppConfig, LogFormat},
    models::{CertificateStatus, CertificateType},
    services::{
        command_runner::set_vars,
        parser::{apply_request_subject, detect_cert_type, inspect_request_subject, parse_cert_details},
        CaOperation, CommandRunner, OperationReport, OperationRunner, PkiStore,
    },
    utils::{AppError, ErrorResponse},
};

#[derive(Debug, Parser)]
#[command(name = "easyrsa-manager", version, about = "Manage an easy-rsa PKI")]
struct Cli {
    /// Configuration file (overrides the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// PKI layout and certificate counts
    Status,
    /// List certificates from the index
    List {
        #[arg(long)]
        status: Option<CertificateStatus>,
    },
    /// Show one certificate from the index
    Show { name: String },
    /// Certificate counts per status
    Counts,
    /// List pending signing requests
    Requests {
        /// Read subject fields with openssl
        #[arg(long)]
        details: bool,
    },
    /// Valid certificates expiring within DAYS
    Expiring {
        #[arg(default_value_t = 30)]
        days: i64,
    },
    /// Move issued files of revoked certificates into revoked/
    CleanupRevoked,
    /// Print the variables of a vars file
    Vars { path: Option<PathBuf> },
    /// Guess the purpose of a certificate file
    CertType { path: PathBuf },
    /// Parsed `show-cert` output
    Details { name: String },

    InitPki,
    BuildCa {
        #[arg(long)]
        cn: Option<String>,
        /// Protect the key with a passphrase
        #[arg(long)]
        pass: bool,
    },
    BuildServerFull {
        name: String,
        #[arg(long)]
        pass: bool,
    },
    BuildClientFull {
        name: String,
        #[arg(long)]
        pass: bool,
    },
    GenReq {
        name: String,
        #[arg(long)]
        pass: bool,
    },
    ImportReq { req_file: PathBuf, short_name: String },
    SignReq {
        cert_type: CertificateType,
        name: String,
    },
    Revoke {
        name: String,
        #[arg(long)]
        reason: Option<String>,
    },
    GenCrl,
    ShowCert { name: String },
}

impl Command {
    /// The CA operation this subcommand maps to, if any
    fn operation(&self) -> Option<CaOperation> {
        let op = match self {
            Command::InitPki => CaOperation::InitPki,
            Command::BuildCa { cn, pass } => CaOperation::BuildCa {
                common_name: cn.clone(),
                nopass: !pass,
            },
            Command::BuildServerFull { name, pass } => CaOperation::BuildServerFull {
                name: name.clone(),
                nopass: !pass,
            },
            Command::BuildClientFull { name, pass } => CaOperation::BuildClientFull {
                name: name.clone(),
                nopass: !pass,
            },
            Command::GenReq { name, pass } => CaOperation::GenReq {
                name: name.clone(),
                nopass: !pass,
            },
            Command::ImportReq {
                req_file,
                short_name,
            } => CaOperation::ImportReq {
                req_file: req_file.clone(),
                short_name: short_name.clone(),
            },
            Command::SignReq { cert_type, name } => CaOperation::SignReq {
                cert_type: *cert_type,
                name: name.clone(),
            },
            Command::Revoke { name, reason } => CaOperation::Revoke {
                name: name.clone(),
                reason: reason.clone(),
            },
            Command::GenCrl => CaOperation::GenCrl,
            Command::ShowCert { name } => CaOperation::ShowCert { name: name.clone() },
            _ => return None,
        };
        Some(op)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration first (before logging, so we know log format)
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program
    let _log_guard = init_logging(&config);

    let store = PkiStore::from_config(&config.easyrsa);
    let runner = CommandRunner::from_config(&config.easyrsa);

    debug!(
        "Using PKI directory {:?}, easy-rsa timeout {:?}",
        store.pki_dir(),
        runner.timeout()
    );

    if let Some(operation) = cli.command.operation() {
        if !runner.check_availability() {
            let err = AppError::Config(format!(
                "easy-rsa not found at {}",
                runner.binary_path().display()
            ));
            return report_error(&err, cli.json);
        }
        let report = OperationRunner::new(&runner, &store).dispatch(operation).await;
        return print_report(&report, cli.json);
    }

    match run_query(&cli, &config, &store, &runner).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => report_error(&e, cli.json),
    }
}

async fn run_query(
    cli: &Cli,
    config: &AppConfig,
    store: &PkiStore,
    runner: &CommandRunner,
) -> Result<(), AppError> {
    match &cli.command {
        Command::Status => {
            let info = store.get_pki_info();
            let counts = store.count_certificates();
            if cli.json {
                print_json(&serde_json::json!({
                    "pki": info,
                    "initialized": info.is_initialized(),
                    "has_ca": info.has_ca(),
                    "counts": counts,
                }))?;
            } else {
                println!("PKI directory: {}", info.pki_dir.display());
                println!("Initialized:   {}", yes_no(info.is_initialized()));
                println!("CA present:    {}", yes_no(info.has_ca()));
                println!(
                    "Certificates:  {} total, {} valid, {} revoked, {} expired",
                    counts.total, counts.valid, counts.revoked, counts.expired
                );
            }
        }
        Command::List { status } => {
            let certs = store.list_certificates(*status);
            if cli.json {
                print_json(&certs)?;
            } else if certs.is_empty() {
                println!("No certificates found");
            } else {
                for cert in &certs {
                    println!("{:>8}  {}", cert.serial, cert);
                }
            }
        }
        Command::Show { name } => {
            let cert = store
                .get_certificate_by_name(name)
                .ok_or_else(|| AppError::NotFound(format!("Certificate not found: {}", name)))?;
            let artifacts = store.certificate_artifacts(name);
            if cli.json {
                print_json(&serde_json::json!({
                    "certificate": cert,
                    "artifacts": artifacts,
                }))?;
            } else {
                println!("{}", cert);
                println!("  Serial:  {}", cert.serial);
                println!("  Expires: {}", cert.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
                if let Some(revoked_at) = cert.revoked_at {
                    println!("  Revoked: {}", revoked_at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                for (label, path) in [
                    ("Certificate", &artifacts.certificate),
                    ("Key", &artifacts.private_key),
                    ("Request", &artifacts.request),
                ] {
                    if let Some(path) = path {
                        println!("  {}: {}", label, path.display());
                    }
                }
            }
        }
        Command::Counts => {
            let counts = store.count_certificates();
            if cli.json {
                print_json(&counts)?;
            } else {
                println!(
                    "total={} valid={} revoked={} expired={}",
                    counts.total, counts.valid, counts.revoked, counts.expired
                );
            }
        }
        Command::Requests { details } => {
            let mut requests = store.list_pending_requests();
            if *details {
                let mut detailed = Vec::with_capacity(requests.len());
                for request in requests {
                    let subject = inspect_request_subject(
                        &request.req_file,
                        &config.easyrsa.openssl_binary,
                        config.easyrsa.inspect_timeout(),
                    )
                    .await;
                    detailed.push(match subject {
                        Some(subject) => apply_request_subject(request, &subject),
                        None => request,
                    });
                }
                requests = detailed;
            }
            if cli.json {
                print_json(&requests)?;
            } else if requests.is_empty() {
                println!("No pending requests");
            } else {
                for request in &requests {
                    println!("{}", request);
                }
            }
        }
        Command::Expiring { days } => {
            let certs = store.expiring_within(*days);
            if cli.json {
                print_json(&certs)?;
            } else if certs.is_empty() {
                println!("No certificates expire within {} days", days);
            } else {
                for cert in &certs {
                    println!("{}", cert);
                }
            }
        }
        Command::CleanupRevoked => {
            let moved = store.cleanup_revoked();
            info!("Revoked cleanup moved {} file(s)", moved);
            if cli.json {
                print_json(&serde_json::json!({ "moved": moved }))?;
            } else {
                println!("Moved {} revoked certificate(s)", moved);
            }
        }
        Command::Vars { path } => {
            let path = path
                .clone()
                .or_else(|| config.easyrsa.vars_file.clone())
                .or_else(|| store.find_vars_file(runner.binary_path()))
                .ok_or_else(|| AppError::NotFound("No vars file found".to_string()))?;
            let vars: std::collections::BTreeMap<_, _> = set_vars(&path).into_iter().collect();
            if cli.json {
                print_json(&vars)?;
            } else {
                println!("# {}", path.display());
                for (name, value) in &vars {
                    println!("{}={}", name, value);
                }
            }
        }
        Command::CertType { path } => {
            let cert_type = detect_cert_type(
                path,
                &config.easyrsa.openssl_binary,
                config.easyrsa.inspect_timeout(),
            )
            .await;
            if cli.json {
                print_json(&serde_json::json!({ "cert_type": cert_type }))?;
            } else {
                println!("{}", cert_type);
            }
        }
        Command::Details { name } => {
            let result = runner.show_cert(name).await;
            if !result.success {
                return Err(AppError::Internal(result.summary()));
            }
            let details = parse_cert_details(&result.stdout);
            if cli.json {
                print_json(&details)?;
            } else {
                for (label, value) in [
                    ("Subject", &details.subject),
                    ("Issuer", &details.issuer),
                    ("Not Before", &details.not_before),
                    ("Not After", &details.not_after),
                    ("Serial", &details.serial),
                    ("Key Algorithm", &details.key_algorithm),
                ] {
                    if let Some(value) = value {
                        println!("{:<14} {}", format!("{}:", label), value);
                    }
                }
            }
        }
        // Operations are dispatched before queries
        _ => {}
    }
    Ok(())
}

fn print_report(report: &OperationReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if report.success() {
        if !report.result.stdout.trim().is_empty() && !report.operation.is_mutating() {
            println!("{}", report.result.stdout.trim_end());
        }
        println!("{} completed", report.operation);
        if let Some(artifacts) = report.artifacts.as_ref().filter(|a| !a.is_empty()) {
            for path in [
                &artifacts.certificate,
                &artifacts.private_key,
                &artifacts.request,
            ]
            .into_iter()
            .flatten()
            {
                println!("  {}", path.display());
            }
        }
    } else {
        eprintln!("{} failed: {}", report.operation, report.result.summary());
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report_error(err: &AppError, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(err))?);
    } else {
        eprintln!("Error: {}", err);
    }
    Ok(ExitCode::FAILURE)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Initialize logging based on configuration
///
/// Returns the appender guard when logging to a file; it must outlive `main`.
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match &log_config.target {
        LogTarget::Console => {
            init_console_logging(subscriber, &log_config.format);
            None
        }
        LogTarget::File => {
            let (writer, guard) = create_file_writer(log_config);
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            init_both_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// Console logging goes to stderr; stdout carries command output
fn init_console_logging<S>(subscriber: S, format: &LogFormat)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_file(false)
                        .with_line_number(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

fn init_file_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(writer))
                .init();
        }
    }
}

fn init_both_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr)) // Console
                .with(fmt::layer().json().with_writer(writer)) // File
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(writer))
                .init();
        }
    }
}
