//! Per-session entitlement reconciler.
//!
//! One [`EntitlementReconciler`] exists per authenticated session. It owns a
//! single background task that listens to the canonical subscription
//! document and applies each delivered state in order, falling back to the
//! legacy document and then to the implicit free tier. The latest reconciled
//! state is published through a `watch` channel, so reads never block.
//!
//! # Usage
//!
//! ```ignore
//! let reconciler = EntitlementReconciler::start(user_id, store, api, ReconcilerConfig::default());
//!
//! if reconciler.can_add_dog(dogs.len() as u32) {
//!     // show the "add dog" button
//! }
//!
//! // Back from checkout: ask the backend to recompute.
//! match reconciler.refresh().await {
//!     RefreshOutcome::Failed => show_retry_banner(),
//!     _ => {}
//! }
//!
//! reconciler.shutdown();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use waggle_types::{DogSlots, Feature, Subscription, UserId};

use crate::config::ReconcilerConfig;
use crate::document::{period_end, SubscriptionDocument, SubscriptionStatusResponse};
use crate::error::StoreError;
use crate::metrics::{self, FallbackReason, RefreshTimer};
use crate::probe::ProbeChain;
use crate::retry::with_retry;
use crate::snapshot::{EntitlementSnapshot, RefreshFailure, SnapshotSource};
use crate::store::{DocumentPath, SubscriptionStatusApi, SubscriptionStore};

/// Result of [`EntitlementReconciler::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Remote returned a subscription; the snapshot was replaced.
    Updated,
    /// Remote returned no subscription; the snapshot was kept.
    Unchanged,
    /// Remote call failed; the snapshot was kept and the error flag set.
    Failed,
    /// Session was torn down before the result arrived; nothing applied.
    Discarded,
}

impl RefreshOutcome {
    /// Label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Discarded => "discarded",
        }
    }

    /// Whether the remote call succeeded and its result was applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated | Self::Unchanged)
    }
}

/// State shared between the session handle and its listener task.
struct Shared {
    user_id: UserId,
    state: watch::Sender<EntitlementSnapshot>,
    store: Arc<dyn SubscriptionStore>,
    api: Arc<dyn SubscriptionStatusApi>,
    chain: ProbeChain,
    config: ReconcilerConfig,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_resolved(&self) -> bool {
        self.state.borrow().is_resolved()
    }

    /// Apply `modify` unless the session is closed. The closed check runs
    /// under the channel lock, so nothing lands after teardown.
    fn apply<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut EntitlementSnapshot),
    {
        self.state.send_if_modified(|snapshot| {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            modify(snapshot);
            true
        })
    }

    fn publish(&self, subscription: Subscription, source: SnapshotSource) -> bool {
        let tier = subscription.tier;
        let status = subscription.status;
        let applied = self.apply(|snapshot| snapshot.resolve(subscription, source, Utc::now()));
        if applied {
            metrics::record_snapshot(source);
            debug!(user_id = %self.user_id, %source, %tier, %status, "entitlements updated");
        }
        applied
    }

    fn adopt(&self, source: SnapshotSource, doc: SubscriptionDocument) -> bool {
        let subscription = doc.into_subscription(&self.user_id, Utc::now(), self.config.default_period);
        self.publish(subscription, source)
    }

    fn adopt_default(&self) -> bool {
        let now = Utc::now();
        let mut subscription = Subscription::default_free(self.user_id.clone(), now);
        subscription.current_period_end = period_end(now, self.config.default_period);
        self.publish(subscription, SnapshotSource::SyntheticDefault)
    }

    /// Resolve from the sources ranked below the canonical document.
    ///
    /// Lower-ranked sources are only consulted when the canonical document
    /// is confirmed missing or nothing has resolved yet. A transient
    /// canonical failure never replaces a loaded snapshot.
    async fn fall_back(&self, reason: FallbackReason) {
        let resolved = self.is_resolved();
        if resolved && reason != FallbackReason::CanonicalMissing {
            warn!(user_id = %self.user_id, reason = reason.as_str(), "keeping last known entitlements");
            return;
        }

        metrics::record_fallback(reason);
        match self
            .chain
            .resolve_after(SnapshotSource::Canonical, &self.user_id)
            .await
        {
            Some((source, doc)) => {
                self.adopt(source, doc);
            }
            // Either no record anywhere, or nothing ever resolved: free tier.
            None => {
                self.adopt_default();
            }
        }
    }
}

async fn run_listener(shared: Arc<Shared>) {
    let mut feed = match shared
        .store
        .listen(DocumentPath::Canonical, &shared.user_id)
        .await
    {
        Ok(feed) => feed,
        Err(err) => {
            warn!(user_id = %shared.user_id, error = %err, "could not listen to canonical subscription");
            shared.fall_back(FallbackReason::ListenFailed).await;
            return;
        }
    };

    while let Some(message) = feed.recv().await {
        if shared.is_closed() {
            break;
        }
        let parsed = message.and_then(|value| value.map(SubscriptionDocument::from_value).transpose());
        match parsed {
            Ok(Some(doc)) => {
                shared.adopt(SnapshotSource::Canonical, doc);
            }
            Ok(None) => shared.fall_back(FallbackReason::CanonicalMissing).await,
            Err(err) => {
                warn!(user_id = %shared.user_id, error = %err, "canonical subscription read failed");
                shared.fall_back(FallbackReason::CanonicalError).await;
            }
        }
    }

    if shared.is_closed() {
        return;
    }
    let err = StoreError::ListenerClosed;
    warn!(user_id = %shared.user_id, error = %err, "canonical listener ended, live updates stopped");
    shared.fall_back(FallbackReason::ListenFailed).await;
}

async fn resolve_once(shared: Arc<Shared>) {
    match shared.chain.resolve(&shared.user_id).await {
        Some((source, doc)) => {
            if source != SnapshotSource::Canonical {
                metrics::record_fallback(FallbackReason::CanonicalMissing);
            }
            shared.adopt(source, doc);
        }
        None => {
            shared.adopt_default();
        }
    }
}

struct Session {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    fn teardown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().ok().and_then(|mut guard| guard.take()) {
            task.abort();
        }
        self.shared.state.send_replace(EntitlementSnapshot::signed_out());
        info!(user_id = %self.shared.user_id, "entitlement session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Entitlement context for one authenticated session.
///
/// Cheap to clone; all clones share the same listener and snapshot. The
/// listener is torn down by [`shutdown`](Self::shutdown) or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct EntitlementReconciler {
    session: Arc<Session>,
}

impl EntitlementReconciler {
    /// Start a session for `user_id`.
    ///
    /// Must be called inside a tokio runtime. Returns immediately with a
    /// loading snapshot; the first resolution arrives from the background
    /// task.
    pub fn start(
        user_id: UserId,
        store: Arc<dyn SubscriptionStore>,
        api: Arc<dyn SubscriptionStatusApi>,
        config: ReconcilerConfig,
    ) -> Self {
        let (state, _) = watch::channel(EntitlementSnapshot::pending(user_id.clone()));
        let chain = ProbeChain::for_store(store.clone(), &config);
        let live_updates = config.live_updates;

        let shared = Arc::new(Shared {
            user_id: user_id.clone(),
            state,
            store,
            api,
            chain,
            config,
            closed: AtomicBool::new(false),
        });

        let task = if live_updates {
            tokio::spawn(run_listener(shared.clone()))
        } else {
            tokio::spawn(resolve_once(shared.clone()))
        };

        info!(%user_id, live_updates, "entitlement session started");

        Self {
            session: Arc::new(Session {
                shared,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Session user.
    pub fn user_id(&self) -> &UserId {
        &self.session.shared.user_id
    }

    /// Last reconciled state. Never blocks.
    pub fn current_entitlements(&self) -> EntitlementSnapshot {
        self.session.shared.state.borrow().clone()
    }

    /// Receive every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<EntitlementSnapshot> {
        self.session.shared.state.subscribe()
    }

    /// Wait until the session has resolved a subscription or been torn down.
    pub async fn settled(&self) -> EntitlementSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| {
                snapshot.is_resolved() || snapshot.source == SnapshotSource::SignedOut
            })
            .await
            .map(|snapshot| snapshot.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.current_entitlements(),
        }
    }

    fn with_snapshot<T>(&self, f: impl FnOnce(&EntitlementSnapshot) -> T) -> T {
        f(&*self.session.shared.state.borrow())
    }

    /// Whether the current tier grants `feature`. False until confirmed.
    pub fn can_use_feature(&self, feature: Feature) -> bool {
        self.with_snapshot(|s| s.can_use_feature(feature))
    }

    /// String form of [`can_use_feature`](Self::can_use_feature).
    pub fn can_use_feature_id(&self, feature_id: &str) -> bool {
        self.with_snapshot(|s| s.can_use_feature_id(feature_id))
    }

    /// Whether one more dog profile is allowed.
    pub fn can_add_dog(&self, current_dog_count: u32) -> bool {
        self.with_snapshot(|s| s.can_add_dog(current_dog_count))
    }

    /// Dog profile slots left.
    pub fn remaining_dog_slots(&self, current_dog_count: u32) -> DogSlots {
        self.with_snapshot(|s| s.remaining_dog_slots(current_dog_count))
    }

    /// Messaging permission.
    pub fn can_message(&self) -> bool {
        self.with_snapshot(EntitlementSnapshot::can_message)
    }

    /// Compatibility matching permission.
    pub fn can_use_compatibility(&self) -> bool {
        self.with_snapshot(EntitlementSnapshot::can_use_compatibility)
    }

    /// Status is active or trialing.
    pub fn is_active(&self) -> bool {
        self.with_snapshot(EntitlementSnapshot::is_active)
    }

    /// Whole days left in the current period, never negative.
    pub fn days_remaining(&self) -> u32 {
        self.with_snapshot(EntitlementSnapshot::days_remaining)
    }

    /// Ask the backend to recompute the subscription.
    ///
    /// Never fails outright: a failed call keeps the current snapshot and
    /// sets its `refresh_error`.
    #[instrument(skip(self), fields(user_id = %self.user_id()), level = "debug")]
    pub async fn refresh(&self) -> RefreshOutcome {
        let shared = &self.session.shared;
        if shared.is_closed() {
            RefreshTimer::start().finish(RefreshOutcome::Discarded, None);
            return RefreshOutcome::Discarded;
        }

        let timer = RefreshTimer::start();
        let api = shared.api.clone();
        let user_id = shared.user_id.clone();
        let result = with_retry(shared.config.retry.clone(), || {
            let api = api.clone();
            let user_id = user_id.clone();
            async move {
                let body = api.get_subscription_status(&user_id).await?;
                SubscriptionStatusResponse::from_value(body)
            }
        })
        .await;

        let now = Utc::now();
        let (outcome, error) = match result {
            Ok(SubscriptionStatusResponse {
                subscription: Some(doc),
            }) => {
                let subscription = doc.into_subscription(&shared.user_id, now, shared.config.default_period);
                let tier = subscription.tier;
                let applied = shared.apply(|snapshot| {
                    snapshot.resolve(subscription, SnapshotSource::Remote, now);
                    snapshot.refresh_error = None;
                });
                if applied {
                    metrics::record_snapshot(SnapshotSource::Remote);
                    debug!(%tier, "subscription refreshed");
                    (RefreshOutcome::Updated, None)
                } else {
                    (RefreshOutcome::Discarded, None)
                }
            }
            Ok(SubscriptionStatusResponse { subscription: None }) => {
                if shared.apply(|snapshot| snapshot.refresh_error = None) {
                    (RefreshOutcome::Unchanged, None)
                } else {
                    (RefreshOutcome::Discarded, None)
                }
            }
            Err(err) => {
                warn!(error = %err, retryable = err.is_retryable(), "subscription refresh failed");
                let failure = RefreshFailure::from_error(&err, now);
                if shared.apply(|snapshot| snapshot.refresh_error = Some(failure)) {
                    (RefreshOutcome::Failed, Some(err))
                } else {
                    (RefreshOutcome::Discarded, Some(err))
                }
            }
        };

        if outcome == RefreshOutcome::Discarded {
            debug!("refresh result arrived after session closed, discarded");
        }
        timer.finish(outcome, error.as_ref());
        outcome
    }

    /// Tear down the listener and reset to the signed-out snapshot.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.session.teardown();
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.session.shared.is_closed()
    }
}

impl std::fmt::Debug for EntitlementReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementReconciler")
            .field("user_id", self.user_id())
            .field("chain", &self.session.shared.chain)
            .field("closed", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
