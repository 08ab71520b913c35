//! Command runner and operation workflow tests against a scripted easy-rsa

#![cfg(unix)]

use std::time::{Duration, Instant};

use rstest::rstest;

use easyrsa_manager::models::CertificateType;
use easyrsa_manager::services::{CaOperation, CommandRunner, OperationRunner};

use crate::common::{index_line, PkiFixture};

#[tokio::test]
async fn test_init_pki_uses_ambient_environment() {
    let fixture = PkiFixture::new();
    let result = fixture.runner().init_pki().await;

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("args: init-pki"));
    assert!(result
        .stdout
        .contains(&format!("pki={} batch=1 cn=", fixture.path().display())));
}

#[tokio::test]
async fn test_build_ca_passes_common_name() {
    let fixture = PkiFixture::new();
    let result = fixture.runner().build_ca(Some("Home Root CA"), true).await;

    assert!(result.success);
    assert!(result.stdout.contains("args: build-ca nopass"));
    assert!(result.stdout.contains("cn=Home Root CA"));
    assert!(std::env::var("EASYRSA_REQ_CN").is_err());
}

#[rstest]
#[case(CertificateType::Server, "sign-req server web")]
#[case(CertificateType::Client, "sign-req client web")]
#[tokio::test]
async fn test_sign_req_arguments(#[case] cert_type: CertificateType, #[case] expected: &str) {
    let fixture = PkiFixture::new().with_request("web");
    let result = fixture.runner().sign_req(cert_type, "web").await;

    assert!(result.success);
    assert!(result.stdout.contains(expected));
}

#[tokio::test]
async fn test_failure_keeps_raw_output_and_simplifies_message() {
    let fixture = PkiFixture::new();
    let result = fixture.runner().revoke("ghost", Some("superseded")).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert!(result.stdout.contains("args: revoke ghost"));
    assert!(!result.stdout.contains("superseded"));
    assert!(result.stderr.contains("[easyrsa] revoking"));
    assert_eq!(
        result.message.as_deref(),
        Some("Easy-RSA error: Unable to revoke as no certificate was found")
    );
}

#[tokio::test]
async fn test_timeout_is_reported_not_raised() {
    let fixture = PkiFixture::new();
    let runner = fixture.runner().with_timeout(Duration::from_millis(300));

    let start = Instant::now();
    let result = runner.gen_crl().await;

    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.message.unwrap().contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_missing_binary_names_path() {
    let fixture = PkiFixture::new();
    let runner = CommandRunner::new(fixture.path().join("no-such-easyrsa"), fixture.path());

    assert!(!runner.check_availability());
    let result = runner.gen_crl().await;
    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.output().contains("no-such-easyrsa"));
}

#[tokio::test]
async fn test_build_server_full_reports_artifacts() {
    let fixture = PkiFixture::new().with_ca();
    let runner = fixture.runner();
    let store = fixture.store();

    let report = OperationRunner::new(&runner, &store)
        .dispatch(CaOperation::BuildServerFull {
            name: "vpn".to_string(),
            nopass: true,
        })
        .await;

    assert!(report.success());
    let artifacts = report.artifacts.expect("artifacts after success");
    assert_eq!(artifacts.certificate, Some(fixture.path().join("issued/vpn.crt")));
    assert_eq!(artifacts.private_key, Some(fixture.path().join("private/vpn.key")));
    assert!(artifacts.request.is_none());

    // The next read sees the new record
    assert!(store.get_certificate_by_name("vpn").is_some());
}

#[tokio::test]
async fn test_existing_name_is_not_rebuilt() {
    let fixture = PkiFixture::new().with_index(&[index_line('V', 365, "01", "vpn")]);
    let runner = fixture.runner();
    let store = fixture.store();

    let report = OperationRunner::new(&runner, &store)
        .dispatch(CaOperation::BuildClientFull {
            name: "vpn".to_string(),
            nopass: true,
        })
        .await;

    assert!(!report.success());
    assert!(report.result.stdout.is_empty());
    assert_eq!(store.count_certificates().total, 1);
}

#[tokio::test]
async fn test_sign_req_requires_request() {
    let fixture = PkiFixture::new();
    let runner = fixture.runner();
    let store = fixture.store();

    let report = OperationRunner::new(&runner, &store)
        .dispatch(CaOperation::SignReq {
            cert_type: CertificateType::Client,
            name: "phone".to_string(),
        })
        .await;

    assert!(!report.success());
    assert_eq!(report.result.stderr, "not_found");
}

#[tokio::test]
async fn test_show_cert_has_no_artifacts() {
    let fixture = PkiFixture::new().with_issued("web");
    let runner = fixture.runner();
    let store = fixture.store();

    let report = OperationRunner::new(&runner, &store)
        .dispatch(CaOperation::ShowCert {
            name: "web".to_string(),
        })
        .await;

    assert!(report.success());
    assert!(report.artifacts.is_none());
    let details = easyrsa_manager::services::parser::parse_cert_details(&report.result.stdout);
    assert_eq!(details.subject.as_deref(), Some("CN=web"));
    assert_eq!(details.serial.as_deref(), Some("0F"));
}

#[tokio::test]
async fn test_runner_and_store_must_share_pki() {
    let fixture = PkiFixture::new();
    let other = PkiFixture::new();
    let runner = fixture.runner();
    let store = other.store();

    let report = OperationRunner::new(&runner, &store)
        .dispatch(CaOperation::GenCrl)
        .await;

    assert!(!report.success());
    assert_eq!(report.result.stderr, "config_error");
    assert!(report.result.stdout.is_empty());
}
