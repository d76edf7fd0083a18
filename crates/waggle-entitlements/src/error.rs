//! Reconciler errors
//!
//! None of these reach UI predicates. Store errors trigger a fallback to the
//! next data source; remote errors become the advisory refresh error flag.

use std::time::Duration;

use thiserror::Error;

/// Errors from the document store (reads and live listeners).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Security rules rejected the read.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Document exists but does not have the subscription shape.
    #[error("malformed subscription document: {0}")]
    Malformed(String),

    /// Live listener was closed by the store.
    #[error("listener closed")]
    ListenerClosed,
}

/// Errors from the remote subscription-status call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Caller's auth token missing or expired.
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    /// Request timeout.
    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    /// Remote function temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Remote function failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Response did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Unauthenticated(_) | Self::Internal(_) | Self::Malformed(_) => false,
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
