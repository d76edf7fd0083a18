//! Common test utilities for waggle-entitlements integration tests

pub mod mock_api;
pub mod mock_store;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;

use waggle_entitlements::{EntitlementSnapshot, ReconcilerConfig, RetryConfig};

#[allow(unused_imports)]
pub use mock_api::MockStatusApi;
#[allow(unused_imports)]
pub use mock_store::MockSubscriptionStore;

/// Subscription document as the billing-event processor writes it.
#[allow(dead_code)]
pub fn subscription_doc(uid: &str, tier: &str, status: &str) -> Value {
    let start = Utc::now() - ChronoDuration::days(5);
    let end = Utc::now() + ChronoDuration::days(25);
    json!({
        "userId": uid,
        "tier": tier,
        "status": status,
        "currentPeriodStart": start.to_rfc3339(),
        "currentPeriodEnd": end.to_rfc3339(),
        "cancelAtPeriodEnd": false,
        "stripeCustomerId": format!("cus_{uid}"),
        "stripeSubscriptionId": format!("sub_{uid}"),
    })
}

/// Remote status response wrapping `doc`.
#[allow(dead_code)]
pub fn status_response(doc: Value) -> Value {
    json!({ "subscription": doc })
}

/// Config without retry delays.
#[allow(dead_code)]
pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig::new().with_retry(RetryConfig::disabled())
}

/// Let spawned listener tasks drain their queues.
#[allow(dead_code)]
pub async fn drain_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Wait (bounded) for a snapshot matching `predicate`.
#[allow(dead_code)]
pub async fn wait_for_snapshot<F>(
    rx: &mut watch::Receiver<EntitlementSnapshot>,
    predicate: F,
) -> EntitlementSnapshot
where
    F: FnMut(&EntitlementSnapshot) -> bool,
{
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed");
    snapshot.clone()
}
