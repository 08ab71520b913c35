//! CA operation step definitions

use cucumber::{then, when};

use easyrsa_manager::services::{CaOperation, OperationRunner};

use crate::features::support::TestWorld;

async fn dispatch(world: &mut TestWorld, operation: CaOperation) {
    let runner = world.fixture().runner();
    let store = world.store();
    let report = OperationRunner::new(&runner, &store).dispatch(operation).await;
    world.last_report = Some(report);
}

#[when(expr = "I run build-server-full for {string}")]
async fn build_server_full(world: &mut TestWorld, name: String) {
    dispatch(world, CaOperation::BuildServerFull { name, nopass: true }).await;
}

#[when(expr = "I revoke {string}")]
async fn revoke(world: &mut TestWorld, name: String) {
    dispatch(world, CaOperation::Revoke { name, reason: None }).await;
}

#[then("the operation should succeed")]
async fn operation_succeeds(world: &mut TestWorld) {
    let report = world.report();
    assert!(report.success(), "operation failed: {}", report.result.summary());
}

#[then(expr = "the operation should fail with a message containing {string}")]
async fn operation_fails_with(world: &mut TestWorld, text: String) {
    let report = world.report();
    assert!(!report.success());
    let message = report.result.message.clone().unwrap_or_default();
    assert!(message.contains(&text), "unexpected message: {}", message);
}

#[then(expr = "the issued certificate for {string} should be reported")]
async fn issued_reported(world: &mut TestWorld, name: String) {
    let expected = world.fixture().path().join(format!("issued/{}.crt", name));
    let artifacts = world.report().artifacts.clone().expect("no artifacts reported");
    assert_eq!(artifacts.certificate, Some(expected));
}
