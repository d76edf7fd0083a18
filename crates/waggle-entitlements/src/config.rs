//! Reconciler configuration

use std::collections::HashMap;
use std::time::Duration;

use waggle_types::{PriceId, Tier, DEFAULT_PERIOD_DAYS};

use crate::retry::RetryConfig;

/// Configuration for an entitlement session.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Consult the pre-migration document location when the canonical one
    /// is empty. Has no effect unless the `legacy-fallback` feature is on.
    /// Default: true
    pub legacy_fallback: bool,

    /// Keep a live listener on the canonical document. When false the
    /// session resolves once from the probe chain and only changes on
    /// `refresh()`.
    /// Default: true
    pub live_updates: bool,

    /// Retry policy for the remote status call.
    pub retry: RetryConfig,

    /// Period length given to records that do not carry one.
    /// Default: 365 days
    pub default_period: chrono::Duration,

    /// Price identifiers per paid tier, supplied by the environment.
    pub price_ids: HashMap<Tier, PriceId>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            legacy_fallback: true,
            live_updates: true,
            retry: RetryConfig::default(),
            default_period: chrono::Duration::days(DEFAULT_PERIOD_DAYS),
            price_ids: HashMap::new(),
        }
    }
}

impl ReconcilerConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the legacy document fallback.
    #[must_use]
    pub fn with_legacy_fallback(mut self, enable: bool) -> Self {
        self.legacy_fallback = enable;
        self
    }

    /// Enable or disable the live canonical listener.
    #[must_use]
    pub fn with_live_updates(mut self, enable: bool) -> Self {
        self.live_updates = enable;
        self
    }

    /// Set the refresh retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the synthetic period length.
    #[must_use]
    pub fn with_default_period(mut self, period: chrono::Duration) -> Self {
        self.default_period = period;
        self
    }

    /// Set the price ID for a tier.
    #[must_use]
    pub fn with_price(mut self, tier: Tier, price_id: impl Into<String>) -> Self {
        self.price_ids.insert(tier, PriceId::new(price_id));
        self
    }

    /// Whether the legacy probe participates in resolution.
    pub fn legacy_fallback_enabled(&self) -> bool {
        cfg!(feature = "legacy-fallback") && self.legacy_fallback
    }

    /// Get the price ID for a tier.
    pub fn price_id(&self, tier: Tier) -> Option<&PriceId> {
        self.price_ids.get(&tier)
    }

    /// Map a price ID back to its tier.
    pub fn tier_for_price(&self, price_id: &PriceId) -> Option<Tier> {
        self.price_ids
            .iter()
            .find(|(_, id)| *id == price_id)
            .map(|(tier, _)| *tier)
    }

    /// Load configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("WAGGLE_LEGACY_FALLBACK") {
            config.legacy_fallback = parse_flag(&value)
                .ok_or(ConfigError::Invalid("WAGGLE_LEGACY_FALLBACK"))?;
        }

        if let Some(value) = lookup("WAGGLE_LIVE_UPDATES") {
            config.live_updates =
                parse_flag(&value).ok_or(ConfigError::Invalid("WAGGLE_LIVE_UPDATES"))?;
        }

        if let Some(value) = lookup("WAGGLE_REFRESH_MAX_ATTEMPTS") {
            let attempts = value
                .parse()
                .map_err(|_| ConfigError::Invalid("WAGGLE_REFRESH_MAX_ATTEMPTS"))?;
            config.retry = config.retry.with_max_attempts(attempts);
        }

        if let Some(value) = lookup("WAGGLE_REFRESH_BASE_DELAY_MS") {
            let millis = value
                .parse()
                .map_err(|_| ConfigError::Invalid("WAGGLE_REFRESH_BASE_DELAY_MS"))?;
            config.retry = config.retry.with_base_delay(Duration::from_millis(millis));
        }

        for (tier, key) in [
            (Tier::Standard, "WAGGLE_PRICE_STANDARD"),
            (Tier::Premium, "WAGGLE_PRICE_PREMIUM"),
        ] {
            if let Some(value) = lookup(key) {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(key));
                }
                config = config.with_price(tier, value.trim());
            }
        }

        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
