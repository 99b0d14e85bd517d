//! Local sign-out.

use super::harness::{session, settle, wait_for_snapshot, wait_settled, Fixture, TestHarness};
use crate::auth_fsm::AuthPhase;
use crate::error::ProviderError;
use crate::guard::{authorize, Access, Requirement};
use crate::state_machine::AuthSnapshot;
use crate::types::Role;
use std::sync::Arc;

#[tokio::test]
async fn sign_out_clears_before_provider_completes() {
    let harness = TestHarness::new();
    harness.provider.set_startup_session(Some(session("u1")));
    harness
        .directory
        .insert("u1", Fixture::tenant("u1", "org-1", &[Role::TenantOwner]));

    let machine = Arc::new(harness.start());
    let ready = wait_settled(&machine).await;
    assert_eq!(ready.phase, AuthPhase::Ready);

    let gate = harness.provider.hold_sign_out();
    let pending = tokio::spawn({
        let machine = machine.clone();
        async move { machine.sign_out().await }
    });

    let snapshot = wait_for_snapshot(&machine, |s| s.phase == AuthPhase::SignedOut).await;
    assert_eq!(*snapshot, AuthSnapshot::signed_out());
    assert_eq!(
        authorize(&snapshot, Requirement::OrgMember),
        Access::SignInRequired
    );

    settle().await;
    assert_eq!(harness.provider.sign_out_calls(), 1);
    assert!(!pending.is_finished());

    gate.release();
    pending.await.unwrap();
    settle().await;

    assert_eq!(*machine.snapshot(), AuthSnapshot::signed_out());
}

#[tokio::test]
async fn sign_out_during_resolution_discards_it() {
    let harness = TestHarness::new();
    harness.provider.set_startup_session(Some(session("u1")));
    harness
        .directory
        .insert("u1", Fixture::tenant("u1", "org-1", &[Role::TenantOwner]));
    let gate = harness.directory.hold_profile("u1");

    let machine = harness.start();
    wait_for_snapshot(&machine, |s| s.user_id() == Some("u1")).await;

    machine.sign_out().await;
    gate.release();
    settle().await;

    assert_eq!(*machine.snapshot(), AuthSnapshot::signed_out());
}

#[tokio::test]
async fn provider_sign_out_failure_is_not_surfaced() {
    let harness = TestHarness::new();
    harness.provider.set_startup_session(Some(session("u1")));
    harness
        .provider
        .fail_sign_out(ProviderError::transport("connection reset"));

    let machine = harness.start();
    wait_settled(&machine).await;

    machine.sign_out().await;

    assert_eq!(*machine.snapshot(), AuthSnapshot::signed_out());
    assert_eq!(harness.provider.sign_out_calls(), 1);
}

#[tokio::test]
async fn repeated_sign_out_publishes_nothing_new() {
    let harness = TestHarness::new();
    let machine = harness.start();
    wait_settled(&machine).await;

    let mut rx = machine.watch();
    rx.borrow_and_update();

    machine.sign_out().await;
    settle().await;

    assert!(!rx.has_changed().unwrap());
    assert_eq!(harness.provider.sign_out_calls(), 1);
}
