//! Common step definitions used across features

use cucumber::given;

use crate::common::{index_line, PkiFixture};
use crate::features::support::TestWorld;

#[given("an initialized PKI")]
async fn initialized_pki(world: &mut TestWorld) {
    world.pki = Some(PkiFixture::new());
}

#[given("an initialized PKI with a CA")]
async fn initialized_pki_with_ca(world: &mut TestWorld) {
    world.pki = Some(PkiFixture::new().with_ca());
}

#[given("an empty directory")]
async fn empty_directory(world: &mut TestWorld) {
    world.pki = Some(PkiFixture::empty());
}

#[given(expr = "the index contains a {word} certificate {string}")]
async fn index_contains_certificate(world: &mut TestWorld, status: String, name: String) {
    let status = match status.as_str() {
        "valid" => 'V',
        "revoked" => 'R',
        "expired" => 'E',
        other => panic!("unknown status in scenario: {}", other),
    };
    let serial = format!("{:02X}", world.index_lines.len() + 1);
    world.add_index_line(index_line(status, 365, &serial, &name));
}
