//! Data sources the reconciler consumes.
//!
//! The billing-event processor is the only writer of subscription documents.
//! Nothing here writes.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use waggle_types::UserId;

use crate::error::{RemoteError, StoreError};

/// Live feed of a single document. Each message is the full document, or
/// `None` when it does not exist.
pub type SubscriptionFeed = mpsc::Receiver<Result<Option<Value>, StoreError>>;

/// Where a subscription document lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentPath {
    /// Current per-user location.
    Canonical,
    /// Pre-migration location, read-only.
    Legacy,
}

impl DocumentPath {
    /// Concrete document path for a user.
    pub fn path_for(&self, user_id: &UserId) -> String {
        match self {
            Self::Canonical => format!("subscriptions/{user_id}"),
            Self::Legacy => format!("users/{user_id}/subscription/current"),
        }
    }

    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Legacy => "legacy",
        }
    }
}

/// Document store holding subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Read a document once.
    async fn read(&self, path: DocumentPath, user_id: &UserId) -> Result<Option<Value>, StoreError>;

    /// Open a live listener on a document. The first message carries the
    /// current state; later messages arrive as the document changes.
    /// Dropping the receiver detaches the listener.
    async fn listen(&self, path: DocumentPath, user_id: &UserId) -> Result<SubscriptionFeed, StoreError>;
}

/// Authoritative remote recomputation of a user's subscription.
///
/// Returns the raw `{ "subscription": ... }` response body.
#[async_trait]
pub trait SubscriptionStatusApi: Send + Sync {
    /// Call `getSubscriptionStatus` on behalf of the user.
    async fn get_subscription_status(&self, user_id: &UserId) -> Result<Value, RemoteError>;
}
