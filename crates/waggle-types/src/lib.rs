//! Waggle Types - Shared domain types
//!
//! This crate contains domain types shared by every Waggle client and the
//! billing-event processor:
//! - User identity
//! - Subscription tiers and the static capability table
//! - Subscription records and statuses
//! - Invoice and payment display records

pub mod billing;
pub mod entitlement;
pub mod error;
pub mod subscription;
pub mod tier;
pub mod user;

pub use billing::*;
pub use entitlement::*;
pub use error::*;
pub use subscription::*;
pub use tier::*;
pub use user::*;
