//! Integration tests for remote refresh and session switching.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use common::{
    drain_tasks, status_response, subscription_doc, test_config, wait_for_snapshot,
    MockStatusApi, MockSubscriptionStore,
};
use waggle_entitlements::{
    DocumentPath, EntitlementProvider, EntitlementReconciler, RefreshOutcome, RemoteError,
    RetryConfig, SnapshotSource,
};
use waggle_types::{Feature, Tier, UserId};

fn start_with(
    store: &MockSubscriptionStore,
    api: &MockStatusApi,
    uid: &str,
) -> EntitlementReconciler {
    EntitlementReconciler::start(
        UserId::from(uid),
        Arc::new(store.clone()),
        Arc::new(api.clone()),
        test_config(),
    )
}

fn provider(store: &MockSubscriptionStore, api: &MockStatusApi) -> EntitlementProvider {
    EntitlementProvider::new(Arc::new(store.clone()), Arc::new(api.clone()), test_config())
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_replaces_snapshot_from_remote() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.respond(Ok(status_response(subscription_doc("u1", "premium", "active"))));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;
    assert_eq!(reconciler.current_entitlements().tier(), Tier::Free);

    let outcome = reconciler.refresh().await;

    assert_eq!(outcome, RefreshOutcome::Updated);
    let snapshot = reconciler.current_entitlements();
    assert_eq!(snapshot.source, SnapshotSource::Remote);
    assert_eq!(snapshot.tier(), Tier::Premium);
    assert!(!snapshot.has_refresh_error());
    assert!(reconciler.can_use_feature(Feature::Analytics));
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot_and_flags_error() {
    let store = MockSubscriptionStore::new();
    store.set(DocumentPath::Canonical, "u1", subscription_doc("u1", "standard", "active"));
    let api = MockStatusApi::new();
    api.respond(Err(RemoteError::Internal("function crashed".into())));

    let reconciler = start_with(&store, &api, "u1");
    let before = reconciler.settled().await;

    let outcome = reconciler.refresh().await;

    assert_eq!(outcome, RefreshOutcome::Failed);
    let after = reconciler.current_entitlements();
    assert_eq!(after.subscription, before.subscription);
    assert_eq!(after.source, SnapshotSource::Canonical);
    let failure = after.refresh_error.expect("refresh error should be set");
    assert!(!failure.retryable);
    assert!(failure.message.contains("function crashed"));
    assert!(reconciler.can_message());
}

#[tokio::test]
async fn test_refresh_error_persists_until_next_success() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.respond(Err(RemoteError::Unauthenticated("token expired".into())));
    api.respond(Ok(status_response(subscription_doc("u1", "standard", "active"))));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Failed);
    assert!(reconciler.current_entitlements().has_refresh_error());

    // A live update does not clear the flag.
    let mut rx = reconciler.subscribe();
    store.set(DocumentPath::Canonical, "u1", subscription_doc("u1", "free", "active"));
    let snapshot = wait_for_snapshot(&mut rx, |s| s.source == SnapshotSource::Canonical).await;
    assert!(snapshot.has_refresh_error());

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Updated);
    let snapshot = reconciler.current_entitlements();
    assert!(!snapshot.has_refresh_error());
    assert_eq!(snapshot.tier(), Tier::Standard);
}

#[tokio::test]
async fn test_refresh_without_remote_subscription_is_unchanged() {
    let store = MockSubscriptionStore::new();
    store.set(DocumentPath::Canonical, "u1", subscription_doc("u1", "standard", "active"));
    let api = MockStatusApi::new();
    api.respond(Ok(json!({ "subscription": null })));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Unchanged);
    let snapshot = reconciler.current_entitlements();
    assert_eq!(snapshot.source, SnapshotSource::Canonical);
    assert_eq!(snapshot.tier(), Tier::Standard);
}

#[tokio::test]
async fn test_malformed_remote_response_fails_refresh() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.respond(Ok(json!({ "subscription": { "tier": "premium" } })));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Failed);
    assert_eq!(reconciler.current_entitlements().tier(), Tier::Free);
}

#[tokio::test]
async fn test_far_future_remote_period_fails_refresh() {
    let store = MockSubscriptionStore::new();
    store.set(DocumentPath::Canonical, "u1", subscription_doc("u1", "standard", "active"));
    let api = MockStatusApi::new();
    let max_ms = DateTime::<Utc>::MAX_UTC.timestamp_millis();
    api.respond(Ok(status_response(json!({
        "tier": "premium",
        "status": "active",
        "currentPeriodStart": max_ms - 1_000,
    }))));

    let reconciler = start_with(&store, &api, "u1");
    let before = reconciler.settled().await;

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Failed);
    let after = reconciler.current_entitlements();
    assert_eq!(after.subscription, before.subscription);
    assert_eq!(after.tier(), Tier::Standard);
    let failure = after.refresh_error.expect("refresh error should be set");
    assert!(!failure.retryable);
}

#[tokio::test]
async fn test_refresh_retries_transient_errors() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.respond(Err(RemoteError::Network("connection reset".into())));
    api.respond(Ok(status_response(subscription_doc("u1", "premium", "active"))));

    let reconciler = EntitlementReconciler::start(
        UserId::from("u1"),
        Arc::new(store.clone()),
        Arc::new(api.clone()),
        test_config().with_retry(
            RetryConfig::new()
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(false),
        ),
    );
    reconciler.settled().await;

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Updated);
    assert_eq!(api.call_count(), 2);
}

#[tokio::test]
async fn test_refresh_after_shutdown_is_discarded() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.respond(Ok(status_response(subscription_doc("u1", "premium", "active"))));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;
    reconciler.shutdown();

    assert_eq!(reconciler.refresh().await, RefreshOutcome::Discarded);
    assert_eq!(api.call_count(), 0);
    assert_eq!(reconciler.current_entitlements().source, SnapshotSource::SignedOut);
}

#[tokio::test]
async fn test_in_flight_refresh_discarded_after_teardown() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    api.hold();
    api.respond(Ok(status_response(subscription_doc("u1", "premium", "active"))));

    let reconciler = start_with(&store, &api, "u1");
    reconciler.settled().await;

    let in_flight = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.refresh().await }
    });
    while api.call_count() == 0 {
        tokio::task::yield_now().await;
    }

    reconciler.shutdown();
    api.release();

    assert_eq!(in_flight.await.unwrap(), RefreshOutcome::Discarded);
    let snapshot = reconciler.current_entitlements();
    assert_eq!(snapshot.source, SnapshotSource::SignedOut);
    assert!(snapshot.subscription.is_none());
}

// =============================================================================
// Session switching
// =============================================================================

#[tokio::test]
async fn test_sign_in_same_user_reuses_session() {
    let store = MockSubscriptionStore::new();
    let api = MockStatusApi::new();
    let mut provider = provider(&store, &api);

    let first = provider.sign_in(UserId::from("u1"));
    first.settled().await;
    let second = provider.sign_in(UserId::from("u1"));

    assert!(!first.is_shut_down());
    assert!(!second.is_shut_down());
    assert_eq!(store.listen_count(), 1);
}

#[tokio::test]
async fn test_switching_users_never_leaks_previous_state() {
    let store = MockSubscriptionStore::new();
    store.set(DocumentPath::Canonical, "alice", subscription_doc("alice", "premium", "active"));
    let api = MockStatusApi::new();
    let mut provider = provider(&store, &api);

    let alice = provider.sign_in(UserId::from("alice"));
    alice.settled().await;
    assert!(provider.can_use_feature(Feature::Analytics));

    let bob = provider.sign_in(UserId::from("bob"));
    assert!(alice.is_shut_down());
    assert_eq!(alice.current_entitlements().source, SnapshotSource::SignedOut);

    let initial = bob.current_entitlements();
    assert_eq!(initial.user_id, Some(UserId::from("bob")));
    assert!(!provider.can_use_feature(Feature::Analytics));

    // Late writes to the old user's document must not reach the new session.
    let mut rx = bob.subscribe();
    store.set(DocumentPath::Canonical, "alice", subscription_doc("alice", "premium", "active"));
    let snapshot = wait_for_snapshot(&mut rx, |s| s.is_resolved()).await;
    drain_tasks().await;

    assert_eq!(snapshot.user_id, Some(UserId::from("bob")));
    assert_eq!(snapshot.source, SnapshotSource::SyntheticDefault);
    assert_eq!(provider.current_entitlements().tier(), Tier::Free);
    assert!(!provider.can_use_feature(Feature::Analytics));
}

#[tokio::test]
async fn test_sign_out_resets_to_signed_out() {
    let store = MockSubscriptionStore::new();
    store.set(DocumentPath::Canonical, "u1", subscription_doc("u1", "standard", "active"));
    let api = MockStatusApi::new();
    let mut provider = provider(&store, &api);

    provider.on_auth_state_changed(Some(UserId::from("u1")));
    let session = provider.session().cloned().expect("session should exist");
    session.settled().await;
    assert!(provider.can_add_dog(2));
    assert!(provider.is_active());

    provider.on_auth_state_changed(None);

    assert!(provider.session().is_none());
    assert!(session.is_shut_down());
    let snapshot = provider.current_entitlements();
    assert_eq!(snapshot.source, SnapshotSource::SignedOut);
    assert!(!provider.can_add_dog(0));
    assert!(!provider.can_use_feature(Feature::DogProfiles));
    assert_eq!(provider.days_remaining(), 0);
    assert_eq!(provider.refresh().await, RefreshOutcome::Discarded);
}
