//! PKI store step definitions

use cucumber::{given, then, when};

use crate::common::index_line;
use crate::features::support::TestWorld;

#[given(expr = "the index contains {int} valid, {int} revoked and {int} expired certificates")]
async fn index_with_counts(world: &mut TestWorld, valid: usize, revoked: usize, expired: usize) {
    for (status, count) in [('V', valid), ('R', revoked), ('E', expired)] {
        for _ in 0..count {
            let n = world.index_lines.len() + 1;
            world.add_index_line(index_line(status, 365, &format!("{:02X}", n), &format!("cert{}", n)));
        }
    }
}

#[given("the index contains a malformed line")]
async fn index_with_malformed_line(world: &mut TestWorld) {
    world.add_index_line("X\t350101000000Z\t\t99\tunknown\t/CN=broken".to_string());
}

#[given(expr = "an issued certificate file for {string}")]
async fn issued_file(world: &mut TestWorld, name: String) {
    let path = world.fixture().path().join(format!("issued/{}.crt", name));
    std::fs::write(path, "cert").expect("write issued certificate");
}

#[when("I count the certificates")]
async fn count_certificates(world: &mut TestWorld) {
    world.counts = Some(world.store().count_certificates());
}

#[when("I list the certificates")]
async fn list_certificates(world: &mut TestWorld) {
    world.certificates = world.store().list_certificates(None);
}

#[when("I clean up revoked certificates")]
async fn cleanup_revoked(world: &mut TestWorld) {
    world.moved = Some(world.store().cleanup_revoked());
}

#[then(expr = "the counts should be {int} total, {int} valid, {int} revoked and {int} expired")]
async fn counts_should_be(
    world: &mut TestWorld,
    total: usize,
    valid: usize,
    revoked: usize,
    expired: usize,
) {
    let counts = world.counts.expect("counts were not taken");
    assert_eq!(counts.total, total);
    assert_eq!(counts.valid, valid);
    assert_eq!(counts.revoked, revoked);
    assert_eq!(counts.expired, expired);
}

#[then(expr = "I should see certificates {string} in order")]
async fn certificates_in_order(world: &mut TestWorld, names: String) {
    let expected: Vec<&str> = names.split(',').collect();
    let actual: Vec<&str> = world
        .certificates
        .iter()
        .map(|c| c.common_name.as_str())
        .collect();
    assert_eq!(actual, expected);
}

#[then("I should see no certificates")]
async fn no_certificates(world: &mut TestWorld) {
    assert!(world.certificates.is_empty());
}

#[then(expr = "{int} certificate file(s) should have been moved")]
async fn files_moved(world: &mut TestWorld, expected: usize) {
    assert_eq!(world.moved, Some(expected));
}

#[then(expr = "{string} should be in the revoked directory")]
async fn in_revoked_dir(world: &mut TestWorld, name: String) {
    let fixture = world.fixture();
    assert!(fixture.path().join(format!("revoked/{}.crt", name)).is_file());
    assert!(!fixture.path().join(format!("issued/{}.crt", name)).exists());
}
