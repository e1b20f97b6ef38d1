//! Out-of-order completions and supersession.

use super::harness::{profile, session, Harness};
use crate::AuthState;
use identity_backend::User;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_later_sign_in_wins_when_earlier_resolves_last() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.backend.push_sign_in(Duration::from_millis(300), session("t-first", "u1"));
    h.backend.push_sign_in(Duration::from_millis(100), session("t-second", "u2"));

    let (first, second) = tokio::join!(
        h.coordinator.sign_in("first@example.com", "pw"),
        h.coordinator.sign_in("second@example.com", "pw"),
    );
    h.settle().await;

    // Both callers get their session back.
    assert_eq!(first.unwrap().access_token, "t-first");
    assert_eq!(second.unwrap().access_token, "t-second");

    let state = h.coordinator.state();
    assert_eq!(
        state.session().map(|s| s.access_token.as_str()),
        Some("t-second")
    );
    assert_eq!(h.store.value("auth_token").as_deref(), Some("t-second"));
    assert_eq!(h.store.value("userId").as_deref(), Some("u2"));
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_started_during_sign_in_wins() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.backend.push_sign_in(Duration::from_millis(200), session("t1", "u1"));

    let (signed_in, signed_out) = tokio::join!(h.coordinator.sign_in("a", "b"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.coordinator.sign_out().await
    });
    h.settle().await;

    assert!(signed_in.is_ok());
    assert!(signed_out.is_ok());
    assert_eq!(h.coordinator.state(), AuthState::Unauthenticated);
    assert!(h.store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_started_during_slow_sign_out_wins() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.sign_in_as("t1", "u1").await;
    h.backend.set_sign_out(Duration::from_millis(500), None);
    // The old session's sign-out must not announce a clear over the new one.
    h.backend.emit_on_sign_out(false);
    h.backend.push_sign_in(Duration::from_millis(100), session("t2", "u2"));

    let (signed_out, signed_in) = tokio::join!(h.coordinator.sign_out(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.coordinator.sign_in("a", "b").await
    });
    h.settle().await;

    assert!(signed_out.is_ok());
    assert_eq!(signed_in.unwrap().access_token, "t2");
    let state = h.coordinator.state();
    assert_eq!(state.user().map(|u| u.id.as_str()), Some("u2"));
    assert_eq!(h.store.value("access_token").as_deref(), Some("t2"));
}

#[tokio::test(start_paused = true)]
async fn test_late_enrichment_for_replaced_identity_is_dropped() {
    let h = Harness::new();
    h.start_signed_out().await;
    // First identity's profile arrives late.
    h.profiles.set(
        "u1",
        Duration::from_millis(500),
        Some(User::new("u1").with_profile(profile(Some("Stale"), None))),
    );
    h.backend.push_sign_in(Duration::ZERO, session("t1", "u1"));
    h.coordinator.sign_in("a", "b").await.unwrap();

    h.coordinator.sign_out().await.unwrap();
    h.sign_in_as("t2", "u1").await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = h.coordinator.state();
    assert_eq!(state.session().map(|s| s.access_token.as_str()), Some("t2"));
    assert_eq!(state.user().unwrap().profile.display_name, None);
    assert_eq!(h.profiles.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_enrichment_survives_token_refresh_of_same_user() {
    let h = Harness::new();
    h.start_signed_out().await;
    h.profiles.set(
        "u1",
        Duration::from_millis(500),
        Some(User::new("u1").with_profile(profile(Some("Ana"), None))),
    );
    h.backend.push_sign_in(Duration::ZERO, session("t1", "u1"));
    h.coordinator.sign_in("a", "b").await.unwrap();

    h.backend
        .emit(identity_backend::SessionEvent::Active(session("t2", "u1")));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let state = h.coordinator.state();
    assert_eq!(state.session().map(|s| s.access_token.as_str()), Some("t2"));
    assert_eq!(
        state.user().unwrap().profile.display_name.as_deref(),
        Some("Ana")
    );
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_pair_session_with_its_user() {
    let h = Harness::new();
    let mut rx = h.coordinator.watch();
    h.start_signed_out().await;

    h.sign_in_as("t1", "u1").await;
    h.sign_in_as("t2", "u2").await;
    h.backend
        .emit(identity_backend::SessionEvent::Active(session("t3", "u2")));
    h.coordinator.sign_out().await.unwrap();
    h.settle().await;

    while let Ok(state) = rx.try_recv() {
        if let AuthState::Authenticated { session, user } = state {
            assert_eq!(session.user_id, user.id);
        }
    }
}
