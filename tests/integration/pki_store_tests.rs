//! PKI store integration tests

use std::fs;

use rstest::rstest;

use easyrsa_manager::models::{CertificateCounts, CertificateStatus};

use crate::common::{index_line, PkiFixture};

#[rstest]
#[case(0, 0, 0)]
#[case(3, 0, 0)]
#[case(2, 1, 1)]
#[case(1, 4, 2)]
fn test_counts_match_index(#[case] valid: usize, #[case] revoked: usize, #[case] expired: usize) {
    let mut lines = Vec::new();
    let mut serial = 0;
    for (status, count) in [('V', valid), ('R', revoked), ('E', expired)] {
        for _ in 0..count {
            serial += 1;
            let cn = format!("cert{}", serial);
            lines.push(index_line(status, 365, &format!("{:02X}", serial), &cn));
        }
    }

    let fixture = PkiFixture::new().with_index(&lines);
    assert_eq!(
        fixture.store().count_certificates(),
        CertificateCounts {
            total: valid + revoked + expired,
            valid,
            revoked,
            expired,
        }
    );
}

#[test]
fn test_uninitialized_directory() {
    let fixture = PkiFixture::empty();
    let store = fixture.store();

    assert!(!store.is_initialized());
    assert!(store.list_certificates(None).is_empty());
    assert!(store.list_certificate_requests().is_empty());
    assert_eq!(store.cleanup_revoked(), 0);
}

#[test]
fn test_pki_info_reflects_live_state() {
    let fixture = PkiFixture::new();
    let store = fixture.store();

    assert!(store.is_initialized());
    assert!(!store.has_ca());
    assert!(!store.get_pki_info().ca_cert_exists());

    let fixture = fixture.with_ca();
    let store = fixture.store();
    assert!(store.has_ca());
    assert!(store.get_pki_info().ca_key_exists());
}

#[test]
fn test_bad_line_skipped_in_order() {
    let lines = vec![
        index_line('V', 30, "01", "first"),
        "X\t350101000000Z\t\t02\tunknown\t/CN=broken".to_string(),
        "garbage".to_string(),
        index_line('R', 30, "03", "second"),
    ];
    let fixture = PkiFixture::new().with_index(&lines);

    let names: Vec<String> = fixture
        .store()
        .list_certificates(None)
        .into_iter()
        .map(|c| c.common_name)
        .collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[rstest]
#[case(CertificateStatus::Valid, 2)]
#[case(CertificateStatus::Revoked, 1)]
#[case(CertificateStatus::Expired, 0)]
fn test_status_filter(#[case] status: CertificateStatus, #[case] expected: usize) {
    let lines = vec![
        index_line('V', 30, "01", "a"),
        index_line('V', 30, "02", "b"),
        index_line('R', 30, "03", "c"),
    ];
    let fixture = PkiFixture::new().with_index(&lines);
    assert_eq!(fixture.store().list_certificates(Some(status)).len(), expected);
}

#[test]
fn test_valid_status_past_expiry_is_not_valid() {
    let lines = vec![index_line('V', -1, "01", "stale")];
    let fixture = PkiFixture::new().with_index(&lines);

    let cert = fixture.store().get_certificate_by_name("stale").unwrap();
    assert_eq!(cert.status, CertificateStatus::Valid);
    assert!(!cert.is_valid());
    assert!(fixture.store().expiring_within(30).is_empty());
}

#[test]
fn test_requests_and_artifacts() {
    let fixture = PkiFixture::new()
        .with_request("phone")
        .with_request("laptop")
        .with_issued("laptop");
    let store = fixture.store();

    assert_eq!(store.list_certificate_requests(), vec!["laptop", "phone"]);

    let artifacts = store.certificate_artifacts("laptop");
    assert!(artifacts.certificate.is_some());
    assert!(artifacts.private_key.is_some());
    assert!(artifacts.request.is_some());
    assert!(store.certificate_artifacts("phone").certificate.is_none());
}

#[test]
fn test_cleanup_moves_only_revoked() {
    let lines = vec![
        index_line('V', 30, "01", "keep"),
        index_line('R', 30, "02", "gone"),
        index_line('R', 30, "03", "never-issued"),
    ];
    let fixture = PkiFixture::new()
        .with_index(&lines)
        .with_issued("keep")
        .with_issued("gone");

    assert_eq!(fixture.store().cleanup_revoked(), 1);
    assert!(fixture.path().join("revoked/gone.crt").is_file());
    assert!(fixture.path().join("issued/keep.crt").is_file());
}

#[test]
fn test_cleanup_continues_after_failed_move() {
    let lines = vec![
        index_line('R', 30, "01", "blocked"),
        index_line('R', 30, "02", "movable"),
    ];
    let fixture = PkiFixture::new()
        .with_index(&lines)
        .with_issued("blocked")
        .with_issued("movable");

    // A directory in the way makes this one move fail
    fs::create_dir_all(fixture.path().join("revoked/blocked.crt/occupied")).unwrap();

    assert_eq!(fixture.store().cleanup_revoked(), 1);
    assert!(fixture.path().join("issued/blocked.crt").is_file());
    assert!(fixture.path().join("revoked/movable.crt").is_file());
}
