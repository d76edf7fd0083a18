//! Backoff for the remote status call
//!
//! `refresh()` runs right after checkout, when the backend may still be
//! cold. A dropped connection or a 503 is retried a couple of times before
//! the snapshot is flagged.
//!
//! # Example
//!
//! ```ignore
//! use waggle_entitlements::retry::{with_retry, RetryConfig};
//!
//! let policy = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_base_delay(Duration::from_millis(100));
//!
//! let body = with_retry(policy, || api.get_subscription_status(&user_id)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RemoteError;

/// Retry policy for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first call; zero disables retrying.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
    /// Ceiling for any single delay, before jitter.
    pub max_delay: Duration,
    /// Spread retries by up to a quarter of the delay.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single call, no retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, enable: bool) -> Self {
        self.add_jitter = enable;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = 1u32
            .checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        let delay = doubled.min(self.max_delay);

        if self.add_jitter {
            delay + jitter(delay / 4)
        } else {
            delay
        }
    }

    /// Delays for every retry this policy allows, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.delay_for_attempt(attempt))
    }
}

/// Pseudo-random duration in `[0, range)`, seeded from the clock.
fn jitter(range: Duration) -> Duration {
    let range_ms = range.as_millis() as u64;
    if range_ms == 0 {
        return Duration::ZERO;
    }
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    Duration::from_millis(u64::from(seed) % range_ms)
}

/// Errors that know whether another attempt might succeed.
pub trait RetryableError: Display {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for RemoteError {
    fn is_retryable(&self) -> bool {
        RemoteError::is_retryable(self)
    }
}

/// Run `operation`, retrying retryable failures per `policy`.
///
/// The last error is returned once retries run out or a non-retryable
/// error comes back.
pub async fn with_retry<F, Fut, T, E>(policy: RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut delays = policy.delays().enumerate();

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        let Some((attempt, delay)) = delays.next() else {
            return Err(err);
        };
        let retry = attempt as u32 + 1;
        warn!(
            error = %err,
            retry,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "remote call failed, retrying"
        );
        crate::metrics::record_retry(retry);
        tokio::time::sleep(delay).await;
    }
}
