//! Retry Policy (§4.5): classifies failures, computes backoff, enforces the
//! per-item retry cap.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::OrchestratorConfig;

/// Whether a failure can be retried or ends the item outright (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retryable: store hiccup, child-process crash, heartbeat timeout, or
    /// the sweeper's "stuck" classification.
    Transient,
    /// Unrecoverable: auth failure, invalid repo, spec-gen exhausted its
    /// attempt budget.
    Terminal,
}

/// Outcome of applying the policy to one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-queue with the given `retryCount` and `nextRetryAt`.
    RetryAt {
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
    },
    /// Retry cap reached, or the failure was terminal: item fails outright.
    Exhausted,
}

/// `base · 2^retryCount`, capped. `retry_count` is the value *after*
/// incrementing for this failure.
pub fn backoff(config: &OrchestratorConfig, retry_count: i32) -> ChronoDuration {
    let base = config.retry_backoff_base_secs;
    let exp = retry_count.max(0) as u32;
    let secs = base.saturating_mul(1i64.checked_shl(exp).unwrap_or(i64::MAX).max(1));
    let secs = secs.max(base);
    let cap_secs = config.retry_backoff_cap.as_secs() as i64;
    ChronoDuration::seconds(secs.min(cap_secs))
}

/// Applies the policy given the item's current `retryCount` and the class
/// of the failure that just occurred.
pub fn apply(
    config: &OrchestratorConfig,
    current_retry_count: i32,
    class: FailureClass,
) -> RetryOutcome {
    if class == FailureClass::Terminal {
        return RetryOutcome::Exhausted;
    }

    let retry_count = current_retry_count + 1;
    if retry_count >= config.retry_cap {
        return RetryOutcome::Exhausted;
    }

    let delay = backoff(config, retry_count);
    RetryOutcome::RetryAt {
        retry_count,
        next_retry_at: Utc::now() + delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> OrchestratorConfig {
        let mut c = OrchestratorConfig::default();
        c.retry_cap = 3;
        c.retry_backoff_base_secs = 30;
        c.retry_backoff_cap = std::time::Duration::from_secs(1800);
        c
    }

    #[test]
    fn terminal_failures_exhaust_immediately() {
        assert_eq!(apply(&cfg(), 0, FailureClass::Terminal), RetryOutcome::Exhausted);
    }

    #[test]
    fn transient_failures_retry_until_cap() {
        let c = cfg();
        match apply(&c, 0, FailureClass::Transient) {
            RetryOutcome::RetryAt { retry_count, .. } => assert_eq!(retry_count, 1),
            RetryOutcome::Exhausted => panic!("expected a retry"),
        }
        match apply(&c, 1, FailureClass::Transient) {
            RetryOutcome::RetryAt { retry_count, .. } => assert_eq!(retry_count, 2),
            RetryOutcome::Exhausted => panic!("expected a retry"),
        }
        assert_eq!(apply(&c, 2, FailureClass::Transient), RetryOutcome::Exhausted);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let c = cfg();
        assert_eq!(backoff(&c, 1), ChronoDuration::seconds(60));
        assert_eq!(backoff(&c, 2), ChronoDuration::seconds(120));
        assert_eq!(backoff(&c, 10), ChronoDuration::seconds(1800));
    }
}
