//! Waggle Entitlements - subscription entitlement reconciler
//!
//! Decides what a signed-in Waggle user may do right now from data that
//! arrives asynchronously: the canonical subscription document (kept live),
//! a legacy document for pre-migration accounts, and an authoritative remote
//! recomputation used after checkout.
//!
//! # Example
//!
//! ```rust,ignore
//! use waggle_entitlements::{EntitlementProvider, ReconcilerConfig};
//! use waggle_types::Feature;
//!
//! let mut provider = EntitlementProvider::new(store, api, ReconcilerConfig::from_env()?);
//!
//! let session = provider.sign_in(user_id);
//! if session.can_use_feature(Feature::Messaging) {
//!     // enable the message button
//! }
//!
//! provider.sign_out();
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod provider;
pub mod reconciler;
pub mod retry;
pub mod snapshot;
pub mod store;

pub use config::{ConfigError, ReconcilerConfig};
pub use document::{SubscriptionDocument, SubscriptionStatusResponse};
pub use error::{RemoteError, StoreError};
pub use probe::{DocumentProbe, ProbeChain, SubscriptionProbe};
pub use provider::EntitlementProvider;
pub use reconciler::{EntitlementReconciler, RefreshOutcome};
pub use retry::RetryConfig;
pub use snapshot::{EntitlementSnapshot, RefreshFailure, SnapshotSource};
pub use store::{DocumentPath, SubscriptionFeed, SubscriptionStatusApi, SubscriptionStore};
