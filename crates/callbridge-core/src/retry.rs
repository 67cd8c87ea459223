//! Exponential backoff policy for the chat backend.
//!
//! Attempts are 1-based failure counts: after the first failed request the
//! caller asks `should_retry(1, err)`, after the first failed retry
//! `should_retry(2, err)`, and so on. Fatal errors (bad credentials,
//! malformed requests) give up immediately regardless of remaining budget.

use crate::error::BackendError;
use std::time::Duration;

/// Backoff strategy for transient backend failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries beyond the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per additional retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

/// Decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp,
}

impl RetryPolicy {
    /// Backoff delay for the given retry index (1-based):
    /// `base_delay * multiplier^(attempt - 1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1).saturating_pow(shift);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether the caller should retry after the `attempt`-th failure.
    pub fn should_retry(&self, attempt: u32, error: &BackendError) -> RetryDecision {
        if error.is_fatal() || attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            after: self.backoff_delay(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn transient_errors_retry_until_budget_exhausted() {
        let policy = RetryPolicy::default();
        let err = BackendError::RateLimited;
        assert_eq!(
            policy.should_retry(1, &err),
            RetryDecision::Retry {
                after: Duration::from_millis(1000)
            }
        );
        assert_eq!(
            policy.should_retry(3, &err),
            RetryDecision::Retry {
                after: Duration::from_millis(4000)
            }
        );
        // Third retry has failed: give up.
        assert_eq!(policy.should_retry(4, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn unauthorized_gives_up_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(1, &BackendError::Unauthorized(401)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn server_errors_and_timeouts_are_retryable() {
        let policy = RetryPolicy::default();
        for err in [
            BackendError::Http(500),
            BackendError::Network("read timed out".into()),
        ] {
            assert!(matches!(
                policy.should_retry(2, &err),
                RetryDecision::Retry { .. }
            ));
        }
    }
}
