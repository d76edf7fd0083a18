//! Auth-driven entitlement context.
//!
//! Owns at most one [`EntitlementReconciler`] and swaps it as the signed-in
//! identity changes. A session is always torn down before the next one
//! starts, so one user's listener never feeds another user's snapshot.

use std::sync::Arc;

use tracing::debug;

use waggle_types::{DogSlots, Feature, UserId};

use crate::config::ReconcilerConfig;
use crate::reconciler::{EntitlementReconciler, RefreshOutcome};
use crate::snapshot::EntitlementSnapshot;
use crate::store::{SubscriptionStatusApi, SubscriptionStore};

/// Entitlement context for the application.
pub struct EntitlementProvider {
    store: Arc<dyn SubscriptionStore>,
    api: Arc<dyn SubscriptionStatusApi>,
    config: ReconcilerConfig,
    session: Option<EntitlementReconciler>,
}

impl EntitlementProvider {
    /// Create a provider with nobody signed in.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        api: Arc<dyn SubscriptionStatusApi>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            api,
            config,
            session: None,
        }
    }

    /// Start (or keep) the session for `user_id`.
    ///
    /// Signing in as the already-signed-in user returns the existing
    /// session. Any other user's session is shut down first.
    pub fn sign_in(&mut self, user_id: UserId) -> EntitlementReconciler {
        if let Some(current) = &self.session {
            if current.user_id() == &user_id && !current.is_shut_down() {
                return current.clone();
            }
        }

        self.sign_out();
        let session = EntitlementReconciler::start(
            user_id,
            self.store.clone(),
            self.api.clone(),
            self.config.clone(),
        );
        self.session = Some(session.clone());
        session
    }

    /// Tear down the current session, if any.
    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(user_id = %session.user_id(), "signing out entitlement session");
            session.shutdown();
        }
    }

    /// Follow the auth backend's current user.
    pub fn on_auth_state_changed(&mut self, user_id: Option<UserId>) {
        match user_id {
            Some(user_id) => {
                self.sign_in(user_id);
            }
            None => self.sign_out(),
        }
    }

    /// Current session, if signed in.
    pub fn session(&self) -> Option<&EntitlementReconciler> {
        self.session.as_ref()
    }

    /// Last reconciled state; the signed-out snapshot when nobody is signed in.
    pub fn current_entitlements(&self) -> EntitlementSnapshot {
        self.session
            .as_ref()
            .map_or_else(EntitlementSnapshot::signed_out, EntitlementReconciler::current_entitlements)
    }

    /// Whether the signed-in user's tier grants `feature`.
    pub fn can_use_feature(&self, feature: Feature) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.can_use_feature(feature))
    }

    /// Whether the signed-in user may add another dog.
    pub fn can_add_dog(&self, current_dog_count: u32) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.can_add_dog(current_dog_count))
    }

    /// Dog slots left; the free allowance when signed out.
    pub fn remaining_dog_slots(&self, current_dog_count: u32) -> DogSlots {
        self.current_entitlements()
            .remaining_dog_slots(current_dog_count)
    }

    /// Whether the signed-in user's subscription is active or trialing.
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(EntitlementReconciler::is_active)
    }

    /// Whole days left in the signed-in user's period.
    pub fn days_remaining(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(0, EntitlementReconciler::days_remaining)
    }

    /// Refresh the signed-in user's subscription; discarded when signed out.
    pub async fn refresh(&self) -> RefreshOutcome {
        match &self.session {
            Some(session) => session.refresh().await,
            None => RefreshOutcome::Discarded,
        }
    }
}

impl Drop for EntitlementProvider {
    fn drop(&mut self) {
        self.sign_out();
    }
}

impl std::fmt::Debug for EntitlementProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementProvider")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
