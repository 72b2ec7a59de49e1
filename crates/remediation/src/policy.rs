//! Retry and timeout policy.
//!
//! Pure functions over the strategy, the retry count and the last attempt
//! timestamp. Nothing here touches the store or the clock; callers pass
//! `now` in.

use crate::crds::RemediationStrategy;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wait reported when no attempt has been recorded and the timeout is zero.
pub const MIN_WAIT: Duration = Duration::from_secs(1);

/// Outcome of asking whether the next remediation decision is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The timeout since the last attempt has elapsed.
    Ready,
    /// Not yet; check again after the contained (non-zero) duration.
    Wait(Duration),
}

impl Readiness {
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }

    /// Remaining wait, zero when ready.
    #[must_use]
    pub fn wait_remaining(self) -> Duration {
        match self {
            Readiness::Ready => Duration::ZERO,
            Readiness::Wait(remaining) => remaining,
        }
    }
}

/// A retry limit counts only when it is strictly positive.
#[must_use]
pub fn retry_limit_is_set(strategy: Option<&RemediationStrategy>) -> bool {
    strategy.is_some_and(|s| s.retry_limit > 0)
}

/// Whether no further attempts are allowed.
///
/// An unset limit counts as already reached, so a remediation without an
/// explicit limit escalates after its first attempt.
#[must_use]
pub fn has_reached_retry_limit(strategy: Option<&RemediationStrategy>, retry_count: u32) -> bool {
    match strategy {
        Some(s) if s.retry_limit > 0 => i64::from(retry_count) >= i64::from(s.retry_limit),
        _ => true,
    }
}

/// Configured timeout, `None` when there is no strategy or no timeout.
#[must_use]
pub fn timeout(strategy: Option<&RemediationStrategy>) -> Option<Duration> {
    strategy.and_then(|s| s.timeout)
}

/// Decide whether `timeout` has elapsed since `last_remediated`.
///
/// Without a recorded attempt the answer is always "wait": the caller is
/// expected to make the first attempt through a phase transition, not a
/// retry. A last-remediated time in the future counts as zero elapsed.
#[must_use]
pub fn time_to_remediate(
    last_remediated: Option<DateTime<Utc>>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Readiness {
    let Some(last) = last_remediated else {
        return Readiness::Wait(timeout.max(MIN_WAIT));
    };

    let elapsed = now
        .signed_duration_since(last)
        .to_std()
        .unwrap_or(Duration::ZERO);

    if elapsed >= timeout {
        Readiness::Ready
    } else {
        Readiness::Wait(timeout - elapsed)
    }
}
