//! Reconciler metrics.
//!
//! # Metrics
//!
//! - `waggle_entitlements_snapshots_total` - Counter of published snapshots by source
//! - `waggle_entitlements_fallbacks_total` - Counter of fallbacks away from the canonical document
//! - `waggle_entitlements_refresh_total` - Counter of refresh calls by outcome and error kind
//! - `waggle_entitlements_refresh_duration_seconds` - Histogram of refresh latency
//! - `waggle_entitlements_retries_total` - Counter of remote retry attempts
//!
//! Recording is a no-op until the embedding application installs a
//! `metrics`-compatible recorder.

use std::time::Instant;

use metrics::{counter, histogram};

use crate::error::RemoteError;
use crate::reconciler::RefreshOutcome;
use crate::snapshot::SnapshotSource;

/// Metric name for published snapshots.
pub const SNAPSHOTS_TOTAL: &str = "waggle_entitlements_snapshots_total";

/// Metric name for fallbacks.
pub const FALLBACKS_TOTAL: &str = "waggle_entitlements_fallbacks_total";

/// Metric name for refresh calls.
pub const REFRESH_TOTAL: &str = "waggle_entitlements_refresh_total";

/// Metric name for refresh duration histogram.
pub const REFRESH_DURATION_SECONDS: &str = "waggle_entitlements_refresh_duration_seconds";

/// Metric name for retry counter.
pub const RETRIES_TOTAL: &str = "waggle_entitlements_retries_total";

/// Why the reconciler left the canonical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Canonical document does not exist.
    CanonicalMissing,
    /// Canonical document could not be read or parsed.
    CanonicalError,
    /// Live listener could not be established.
    ListenFailed,
}

impl FallbackReason {
    /// Label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CanonicalMissing => "canonical_missing",
            Self::CanonicalError => "canonical_error",
            Self::ListenFailed => "listen_failed",
        }
    }
}

/// Record a published snapshot.
pub fn record_snapshot(source: SnapshotSource) {
    counter!(SNAPSHOTS_TOTAL, "source" => source.as_str()).increment(1);
}

/// Record a fallback away from the canonical document.
pub fn record_fallback(reason: FallbackReason) {
    counter!(FALLBACKS_TOTAL, "reason" => reason.as_str()).increment(1);
}

/// Record a retry attempt (1-indexed).
pub fn record_retry(attempt: u32) {
    counter!(RETRIES_TOTAL, "attempt" => attempt.to_string()).increment(1);
}

/// Timer for a refresh call; records outcome and duration on [`finish`].
///
/// [`finish`]: RefreshTimer::finish
#[must_use]
pub struct RefreshTimer {
    start: Instant,
}

impl RefreshTimer {
    /// Start a new refresh timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the outcome and return the elapsed duration.
    ///
    /// `error` is the remote failure, if the call failed; its
    /// [`kind`](RemoteError::kind) becomes the `error_kind` label.
    pub fn finish(self, outcome: RefreshOutcome, error: Option<&RemoteError>) -> std::time::Duration {
        let duration = self.start.elapsed();
        let error_kind = error.map_or("none", RemoteError::kind);
        counter!(REFRESH_TOTAL, "outcome" => outcome.as_str(), "error_kind" => error_kind).increment(1);
        histogram!(REFRESH_DURATION_SECONDS, "outcome" => outcome.as_str())
            .record(duration.as_secs_f64());
        duration
    }
}

/// Describe all metrics for registration with a recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(
        SNAPSHOTS_TOTAL,
        Unit::Count,
        "Entitlement snapshots published, by data source"
    );

    describe_counter!(
        FALLBACKS_TOTAL,
        Unit::Count,
        "Times resolution fell back from the canonical subscription document"
    );

    describe_counter!(
        REFRESH_TOTAL,
        Unit::Count,
        "Explicit subscription refresh calls, by outcome and error kind"
    );

    describe_histogram!(
        REFRESH_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of explicit subscription refresh calls"
    );

    describe_counter!(
        RETRIES_TOTAL,
        Unit::Count,
        "Retry attempts against the remote subscription status call"
    );
}
