//! Entitlement snapshots
//!
//! A snapshot is the reconciled answer to "what can this user do right now".
//! Every gate is computed here so UI code never re-derives a decision from
//! raw subscription fields.

use chrono::{DateTime, Utc};
use serde::Serialize;

use waggle_types::{
    BillingIdentifiers, DogSlots, EntitlementCheck, EntitlementLimits, Feature, Subscription,
    SubscriptionStatus, Tier, UserId,
};

use crate::error::RemoteError;

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// No authenticated user.
    SignedOut,
    /// Authenticated, nothing resolved yet.
    Pending,
    /// Canonical document.
    Canonical,
    /// Pre-migration document.
    Legacy,
    /// No record anywhere; implicit free tier.
    SyntheticDefault,
    /// Authoritative remote recomputation.
    Remote,
}

impl SnapshotSource {
    /// Label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignedOut => "signed_out",
            Self::Pending => "pending",
            Self::Canonical => "canonical",
            Self::Legacy => "legacy",
            Self::SyntheticDefault => "synthetic_default",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory error left by a failed `refresh()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshFailure {
    /// Human-readable cause.
    pub message: String,
    /// Whether trying again might help.
    pub retryable: bool,
    /// When the refresh failed.
    pub at: DateTime<Utc>,
}

impl RefreshFailure {
    /// Build from a remote error.
    pub fn from_error(err: &RemoteError, at: DateTime<Utc>) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_retryable(),
            at,
        }
    }
}

/// Reconciled entitlement state for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementSnapshot {
    /// Session user, if signed in.
    pub user_id: Option<UserId>,
    /// Resolved subscription; `None` until something resolves.
    pub subscription: Option<Subscription>,
    /// Data source of `subscription`.
    pub source: SnapshotSource,
    /// Set when the last `refresh()` failed; cleared by a successful one.
    pub refresh_error: Option<RefreshFailure>,
    /// When `subscription` was last replaced.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EntitlementSnapshot {
    /// No user signed in.
    pub fn signed_out() -> Self {
        Self {
            user_id: None,
            subscription: None,
            source: SnapshotSource::SignedOut,
            refresh_error: None,
            resolved_at: None,
        }
    }

    /// Signed in, waiting on the first read.
    pub fn pending(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            subscription: None,
            source: SnapshotSource::Pending,
            refresh_error: None,
            resolved_at: None,
        }
    }

    /// Replace the subscription, keeping the refresh error flag.
    pub(crate) fn resolve(&mut self, subscription: Subscription, source: SnapshotSource, at: DateTime<Utc>) {
        self.subscription = Some(subscription);
        self.source = source;
        self.resolved_at = Some(at);
    }

    /// Whether the first read is still outstanding.
    pub fn is_loading(&self) -> bool {
        self.source == SnapshotSource::Pending
    }

    /// Whether a subscription has been confirmed from some source.
    pub fn is_resolved(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether the last refresh failed.
    pub fn has_refresh_error(&self) -> bool {
        self.refresh_error.is_some()
    }

    /// Current tier; free until resolved.
    pub fn tier(&self) -> Tier {
        self.subscription
            .as_ref()
            .map_or(Tier::Free, |sub| sub.tier)
    }

    /// Current status, once resolved.
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.subscription.as_ref().map(|sub| sub.status)
    }

    /// Capability table for the current tier.
    pub fn limits(&self) -> &'static EntitlementLimits {
        self.tier().limits()
    }

    /// Whether the tier grants `feature`. False until resolved.
    pub fn can_use_feature(&self, feature: Feature) -> bool {
        self.is_resolved() && self.limits().has_feature(feature)
    }

    /// String form of [`can_use_feature`](Self::can_use_feature); unknown ids are denied.
    pub fn can_use_feature_id(&self, feature_id: &str) -> bool {
        feature_id
            .parse::<Feature>()
            .is_ok_and(|feature| self.can_use_feature(feature))
    }

    /// Feature check with an upgrade hint when denied.
    pub fn check_feature(&self, feature: Feature) -> EntitlementCheck {
        if !self.is_resolved() {
            return EntitlementCheck::denied("entitlements not loaded", None);
        }
        if self.limits().has_feature(feature) {
            return EntitlementCheck::allowed();
        }
        let required = feature.min_tier();
        EntitlementCheck::denied(
            format!("Feature '{feature}' requires {required} tier or higher"),
            Some(required),
        )
    }

    /// Whether one more dog profile is allowed. False until resolved.
    pub fn can_add_dog(&self, current_dog_count: u32) -> bool {
        self.is_resolved() && self.limits().allows_dog(current_dog_count)
    }

    /// Dog profile slots left. Reports the free allowance until resolved.
    pub fn remaining_dog_slots(&self, current_dog_count: u32) -> DogSlots {
        self.limits().remaining_dog_slots(current_dog_count)
    }

    /// Messaging permission, from the tier alone. False until resolved.
    pub fn can_message(&self) -> bool {
        self.is_resolved() && self.limits().can_message
    }

    /// Compatibility matching permission, from the tier alone. False until resolved.
    pub fn can_use_compatibility(&self) -> bool {
        self.is_resolved() && self.limits().can_use_compatibility
    }

    /// Status is active or trialing.
    pub fn is_active(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Whether the subscription ends with the current period.
    pub fn will_cancel(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|sub| sub.cancel_at_period_end)
    }

    /// Whole days left in the period as of `now`; zero when unresolved or lapsed.
    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> u32 {
        self.subscription
            .as_ref()
            .map_or(0, |sub| sub.days_remaining_at(now))
    }

    /// Whole days left in the period.
    pub fn days_remaining(&self) -> u32 {
        self.days_remaining_at(Utc::now())
    }

    /// External billing identifiers, for portal deep links.
    pub fn billing_identifiers(&self) -> BillingIdentifiers {
        self.subscription
            .as_ref()
            .map(Subscription::billing_identifiers)
            .unwrap_or_default()
    }
}
