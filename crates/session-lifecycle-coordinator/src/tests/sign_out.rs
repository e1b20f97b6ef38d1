//! Sign-out always clears locally.

use super::harness::{phases, session, Failure, Harness};
use crate::{AuthError, AuthPhase, AuthState};
use credential_store::StorageKeys;
use identity_backend::{Profile, SessionEvent};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_state_and_every_key() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.coordinator
        .update_user(&Profile {
            locale: Some("en".into()),
            ..Default::default()
        })
        .unwrap();
    h.settle().await;
    assert_eq!(h.store.snapshot().len(), StorageKeys::SESSION_KEYS.len());
    let mut rx = h.coordinator.watch();

    h.coordinator.sign_out().await.unwrap();

    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
    assert!(h.store.snapshot().is_empty());
    assert_eq!(h.backend.sign_out_calls(), 1);
    assert_eq!(
        phases(&mut rx),
        vec![AuthPhase::SigningOut, AuthPhase::Unauthenticated]
    );
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_is_returned_but_local_state_cleared() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.backend
        .set_sign_out(Duration::from_millis(20), Some(Failure::Unavailable));

    let err = h.coordinator.sign_out().await.unwrap_err();

    assert!(matches!(err, AuthError::BackendUnavailable(_)));
    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
    assert!(h.store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_storage_cleared_before_backend_is_called() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.backend.set_sign_out(Duration::from_secs(2), None);

    let coordinator = h.coordinator.clone();
    let sign_out = tokio::spawn(async move { coordinator.sign_out().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.coordinator.state(), AuthState::SigningOut);
    assert!(h.store.snapshot().is_empty());

    sign_out.await.unwrap().unwrap();
    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_failing_key_does_not_stop_clear() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.store.fail_key("userToken");

    h.coordinator.sign_out().await.unwrap();

    let data = h.store.snapshot();
    assert_eq!(data.len(), 1);
    assert!(data.contains_key("userToken"));
    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_right_after_sign_in_leaves_store_empty() {
    let h = Harness::new();
    h.start_signed_out().await;

    h.backend.push_sign_in(Duration::ZERO, session("t1", "u1"));
    h.coordinator.sign_in("a", "b").await.unwrap();
    // No settling: the persist is still queued.
    h.coordinator.sign_out().await.unwrap();
    h.settle().await;

    assert!(h.store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_active_event_while_signing_out_is_ignored() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.backend.set_sign_out(Duration::from_millis(500), None);

    let coordinator = h.coordinator.clone();
    let sign_out = tokio::spawn(async move { coordinator.sign_out().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.backend.emit(SessionEvent::Active(session("t1", "u1")));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.coordinator.state(), AuthState::SigningOut);

    sign_out.await.unwrap().unwrap();
    h.settle().await;
    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
    assert!(h.store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_when_signed_out_still_clears_store() {
    let h = Harness::new();
    h.store.seed("auth_token", "orphan");
    h.backend.set_lookup(Duration::ZERO, None);
    h.coordinator.initialize().await.unwrap();
    h.settle().await;

    h.coordinator.sign_out().await.unwrap();

    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
    assert!(h.store.value("auth_token").is_none());
}
