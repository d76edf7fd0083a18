//! Subscription document shape written by the billing-event processor.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use waggle_types::{
    CustomerId, ExternalSubscriptionId, PriceId, Subscription, SubscriptionStatus, Tier, UserId,
};

use crate::error::{RemoteError, StoreError};

/// Stored subscription document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDocument {
    /// Owner uid, as written by the processor
    #[serde(default)]
    pub user_id: Option<String>,
    /// Tier; anything unrecognised reads as free
    #[serde(default, deserialize_with = "lenient_tier")]
    pub tier: Tier,
    /// Status
    pub status: SubscriptionStatus,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, rename = "stripeCustomerId", alias = "customerId")]
    pub customer_id: Option<CustomerId>,
    #[serde(default, rename = "stripeSubscriptionId", alias = "subscriptionId")]
    pub subscription_id: Option<ExternalSubscriptionId>,
    #[serde(default, rename = "stripePriceId", alias = "priceId")]
    pub price_id: Option<PriceId>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub trial_end: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionDocument {
    /// Parse a stored document.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        serde_json::from_value(value).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// Convert to a [`Subscription`] for `user_id`.
    ///
    /// Missing period bounds get a synthetic period starting at `now`; an end
    /// earlier than the start is clamped to the start.
    pub fn into_subscription(
        self,
        user_id: &UserId,
        now: DateTime<Utc>,
        default_period: chrono::Duration,
    ) -> Subscription {
        if let Some(owner) = self.user_id.as_deref() {
            if owner != user_id.as_str() {
                warn!(%user_id, owner, "subscription document owner does not match session user");
            }
        }

        let start = self.current_period_start.unwrap_or(now);
        let mut end = self
            .current_period_end
            .unwrap_or_else(|| period_end(start, default_period));
        if end < start {
            warn!(%user_id, %start, %end, "period end precedes start, clamping");
            end = start;
        }
        let created_at = self.created_at.unwrap_or(start);

        Subscription {
            user_id: user_id.clone(),
            tier: self.tier,
            status: self.status,
            current_period_start: start,
            current_period_end: end,
            cancel_at_period_end: self.cancel_at_period_end,
            customer_id: self.customer_id,
            subscription_id: self.subscription_id,
            price_id: self.price_id,
            trial_end: self.trial_end,
            canceled_at: self.canceled_at,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Response body of `getSubscriptionStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatusResponse {
    /// Recomputed subscription, if the user has one
    #[serde(default)]
    pub subscription: Option<SubscriptionDocument>,
}

impl SubscriptionStatusResponse {
    /// Parse a raw response body.
    pub fn from_value(value: Value) -> Result<Self, RemoteError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// End of a period of `length` starting at `start`, saturating at the
/// representable bounds instead of overflowing.
pub(crate) fn period_end(start: DateTime<Utc>, length: chrono::Duration) -> DateTime<Utc> {
    start.checked_add_signed(length).unwrap_or(if length < chrono::Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

fn lenient_tier<'de, D>(deserializer: D) -> Result<Tier, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let tier = match &raw {
        Value::String(s) => {
            let tier = Tier::from_str_lossy(s);
            if tier == Tier::Free && !s.trim().eq_ignore_ascii_case("free") {
                warn!(value = %s, "unknown tier in subscription document, treating as free");
            }
            tier
        }
        Value::Null => Tier::Free,
        other => {
            warn!(value = %other, "non-string tier in subscription document, treating as free");
            Tier::Free
        }
    };
    Ok(tier)
}

/// Timestamps as the document store hands them out: RFC 3339 strings,
/// `{seconds, nanoseconds}` objects, or epoch milliseconds.
///
/// Anything after year 9999 is rejected as malformed.
mod timestamp {
    use super::*;
    use chrono::Datelike;
    use serde::de::Error;

    const MAX_YEAR: i32 = 9999;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Millis(i64),
        Parts {
            #[serde(alias = "_seconds")]
            seconds: i64,
            #[serde(default, alias = "_nanoseconds")]
            nanoseconds: u32,
        },
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<RawTimestamp>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let parsed = match raw {
            RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {s:?}: {e}")))?,
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}")))?,
            RawTimestamp::Parts {
                seconds,
                nanoseconds,
            } => Utc
                .timestamp_opt(seconds, nanoseconds)
                .single()
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {seconds}")))?,
        };
        if parsed.year() > MAX_YEAR {
            return Err(D::Error::custom(format!("timestamp beyond year {MAX_YEAR}: {parsed}")));
        }
        Ok(Some(parsed))
    }
}
