//! Billing and payment types
//!
//! Invoices and payments are display records. Entitlement decisions never
//! read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Payment processor customer ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl CustomerId {
    /// Create a new customer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment processor price ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceId(pub String);

impl PriceId {
    /// Create a new price ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PriceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment processor subscription ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalSubscriptionId(pub String);

impl ExternalSubscriptionId {
    /// Create a new subscription ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ExternalSubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Invoice is a draft
    Draft,
    /// Invoice is open and awaiting payment
    Open,
    /// Invoice has been paid
    Paid,
    /// Invoice is void
    Void,
    /// Invoice is uncollectible
    Uncollectible,
}

/// Invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Invoice ID
    pub id: String,
    /// User who owns the invoice
    pub user_id: UserId,
    /// Invoice status
    pub status: InvoiceStatus,
    /// Amount in the currency's minor unit
    pub amount_cents: i64,
    /// Currency (e.g., "usd")
    pub currency: String,
    /// Invoice description
    pub description: Option<String>,
    /// Hosted invoice URL
    pub hosted_invoice_url: Option<String>,
    /// Invoice period start
    pub period_start: DateTime<Utc>,
    /// Invoice period end
    pub period_end: DateTime<Utc>,
    /// When the invoice was created
    pub created_at: DateTime<Utc>,
    /// When the invoice was paid (if paid)
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Amount formatted for display, e.g. `"12.99 USD"`
    pub fn format_amount(&self) -> String {
        format_amount(self.amount_cents, &self.currency)
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment went through
    Succeeded,
    /// Payment is still processing
    Pending,
    /// Payment was declined or errored
    Failed,
    /// Payment was refunded
    Refunded,
}

/// A single payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Payment ID
    pub id: String,
    /// User who made the payment
    pub user_id: UserId,
    /// Invoice this payment settles, if any
    pub invoice_id: Option<String>,
    /// Amount in the currency's minor unit
    pub amount_cents: i64,
    /// Currency (e.g., "usd")
    pub currency: String,
    /// Payment status
    pub status: PaymentStatus,
    /// When the payment was created
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Amount formatted for display, e.g. `"12.99 USD"`
    pub fn format_amount(&self) -> String {
        format_amount(self.amount_cents, &self.currency)
    }
}

fn format_amount(amount_cents: i64, currency: &str) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02} {}", abs / 100, abs % 100, currency.to_uppercase())
}
