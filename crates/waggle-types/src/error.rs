//! Common error types

use thiserror::Error;

/// Common errors across Waggle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaggleError {
    /// Feature id not in the capability table
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Invalid subscription status
    #[error("invalid subscription status: {0}")]
    InvalidStatus(String),

    /// Negative dog limit other than the unlimited sentinel
    #[error("invalid dog limit: {0}")]
    InvalidDogLimit(i64),
}
