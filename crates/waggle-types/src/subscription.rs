//! Subscription types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, EntitlementLimits, ExternalSubscriptionId, PriceId, Tier, UserId, WaggleError};

/// Length of the synthetic period given to users with no subscription record
pub const DEFAULT_PERIOD_DAYS: i64 = 365;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Subscription status, as reported by the payment processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active
    Active,
    /// Subscription was cancelled
    #[serde(alias = "canceled")]
    Cancelled,
    /// Subscription ran out without renewal
    Expired,
    /// Initial payment has not completed
    Incomplete,
    /// Initial payment never completed
    IncompleteExpired,
    /// Payment is past due
    PastDue,
    /// In trial period
    Trialing,
    /// Retries exhausted without payment
    Unpaid,
}

impl SubscriptionStatus {
    /// All statuses
    pub const ALL: [SubscriptionStatus; 8] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Expired,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Unpaid,
    ];

    /// Whether this status grants the paid behavior of the tier
    pub const fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    /// Whether the processor will not move this subscription again
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired | Self::IncompleteExpired)
    }

    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Trialing => "trialing",
            Self::Unpaid => "unpaid",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = WaggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canceled" => Ok(Self::Cancelled),
            other => Self::ALL
                .into_iter()
                .find(|status| status.as_str() == other)
                .ok_or_else(|| WaggleError::InvalidStatus(s.to_string())),
        }
    }
}

/// External billing identifiers, for customer-portal deep links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingIdentifiers {
    /// Payment processor customer
    pub customer_id: Option<CustomerId>,
    /// Payment processor subscription
    pub subscription_id: Option<ExternalSubscriptionId>,
    /// Price the subscription is billed at
    pub price_id: Option<PriceId>,
}

/// One user's current billing relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// User who owns the subscription
    pub user_id: UserId,
    /// Current tier
    pub tier: Tier,
    /// Subscription status
    pub status: SubscriptionStatus,
    /// Current billing period start
    pub current_period_start: DateTime<Utc>,
    /// Current billing period end
    pub current_period_end: DateTime<Utc>,
    /// Whether the subscription ends when the current period does
    pub cancel_at_period_end: bool,
    /// Payment processor customer ID
    pub customer_id: Option<CustomerId>,
    /// Payment processor subscription ID
    pub subscription_id: Option<ExternalSubscriptionId>,
    /// Payment processor price ID
    pub price_id: Option<PriceId>,
    /// End of the trial, if any
    pub trial_end: Option<DateTime<Utc>>,
    /// When cancellation was requested
    pub canceled_at: Option<DateTime<Utc>>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Implicit record for a user with no subscription anywhere: free tier,
    /// active, one-year period starting now.
    pub fn default_free(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + Duration::days(DEFAULT_PERIOD_DAYS),
            cancel_at_period_end: false,
            customer_id: None,
            subscription_id: None,
            price_id: None,
            trial_end: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Capability table for the subscription's tier
    pub fn limits(&self) -> &'static EntitlementLimits {
        self.tier.limits()
    }

    /// Active or trialing. A pending cancellation does not end entitlement.
    pub fn is_active(&self) -> bool {
        self.status.is_entitled()
    }

    /// Whole days left in the current period, rounded up, never negative
    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> u32 {
        let millis = (self.current_period_end - now).num_milliseconds();
        if millis <= 0 {
            return 0;
        }
        let days = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// External billing identifiers
    pub fn billing_identifiers(&self) -> BillingIdentifiers {
        BillingIdentifiers {
            customer_id: self.customer_id.clone(),
            subscription_id: self.subscription_id.clone(),
            price_id: self.price_id.clone(),
        }
    }
}
