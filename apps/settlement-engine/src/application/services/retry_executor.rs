//! Rate-limit-aware retry for exchange calls.
//!
//! Only [`ExchangeError::RateLimited`] is retried. A server `Retry-After`
//! hint is honoured up to the maximum backoff; otherwise the delay grows
//! exponentially with jitter. Attempts are bounded and exhaustion returns
//! the original error, the one from the first attempt.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::application::ports::ExchangeError;

/// Retry policy for exchange calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRetryPolicy {
    /// Retries after the first attempt (default: 5).
    pub max_retries: u32,
    /// Initial backoff (default: 200ms).
    pub initial_backoff: Duration,
    /// Backoff cap, also applied to server hints (default: 30s).
    pub max_backoff: Duration,
    /// Backoff multiplier (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for ExchangeRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current_attempt: u32,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a calculator from a policy.
    #[must_use]
    pub const fn new(policy: &ExchangeRetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: policy.max_retries,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next delay, or `None` once retries are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }
        let base = self.base_backoff_ms();
        let capped = self.apply_jitter(base).min(self.max_backoff_ms);
        self.current_attempt += 1;
        Some(Duration::from_millis(capped))
    }

    /// Consume one attempt for a server-provided delay, capped at the
    /// maximum backoff. `None` once retries are exhausted.
    pub fn next_hinted(&mut self, hint: Duration) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }
        self.current_attempt += 1;
        Some(hint.min(Duration::from_millis(self.max_backoff_ms)))
    }

    /// Attempts consumed.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(self.current_attempt).unwrap_or(i32::MAX));
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - range).max(0.0);
        let max = backoff_ms as f64 + range;
        rand::rng().random_range(min..=max) as u64
    }
}

/// Runs exchange operations under an [`ExchangeRetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RateLimitRetryExecutor {
    policy: ExchangeRetryPolicy,
}

impl RateLimitRetryExecutor {
    /// Create an executor.
    #[must_use]
    pub const fn new(policy: ExchangeRetryPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use.
    #[must_use]
    pub const fn policy(&self) -> &ExchangeRetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying rate-limit failures.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut backoff = ExponentialBackoffCalculator::new(&self.policy);
        let mut original: Option<ExchangeError> = None;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_rate_limited() => return Err(err),
                Err(err) => err,
            };

            let delay = match err.retry_after() {
                Some(hint) => backoff.next_hinted(hint),
                None => backoff.next_backoff(),
            };
            let Some(delay) = delay else {
                tracing::warn!(
                    operation = operation_name,
                    attempts = backoff.current_attempt() + 1,
                    error = %err,
                    "Exchange retries exhausted"
                );
                return Err(original.unwrap_or(err));
            };
            if original.is_none() {
                original = Some(err);
            }

            counter!("exchange_retries_total", "operation" => operation_name.to_string())
                .increment(1);
            tracing::warn!(
                operation = operation_name,
                attempt = backoff.current_attempt(),
                delay_ms = delay.as_millis() as u64,
                "Exchange rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> ExchangeRetryPolicy {
        ExchangeRetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn rate_limited(retry_after: Option<Duration>) -> ExchangeError {
        ExchangeError::RateLimited {
            retry_after,
            message: "too many requests".to_string(),
        }
    }

    #[test]
    fn backoff_sequence_without_jitter() {
        let policy = ExchangeRetryPolicy {
            jitter_factor: 0.0,
            ..ExchangeRetryPolicy::default()
        };
        let mut backoff = ExponentialBackoffCalculator::new(&policy);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(800)));
    }

    #[test]
    fn server_hint_is_capped() {
        let mut backoff = ExponentialBackoffCalculator::new(&fast_policy(3));
        assert_eq!(
            backoff.next_hinted(Duration::from_secs(60)),
            Some(Duration::from_millis(5))
        );
        assert_eq!(backoff.current_attempt(), 1);
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = ExchangeRetryPolicy::default();
        for _ in 0..100 {
            let mut backoff = ExponentialBackoffCalculator::new(&policy);
            let delay = backoff.next_backoff().unwrap();
            assert!(delay >= Duration::from_millis(160) && delay <= Duration::from_millis(240));
        }
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let executor = RateLimitRetryExecutor::new(fast_policy(3));
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("place_order", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(rate_limited(Some(Duration::from_millis(1))))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let executor = RateLimitRetryExecutor::new(fast_policy(3));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("cancel_order", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExchangeError::Transport {
                    message: "connection reset".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(ExchangeError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_original_error() {
        let executor = RateLimitRetryExecutor::new(fast_policy(2));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute("query_order", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited(Some(Duration::from_millis(2))))
                } else {
                    Err(rate_limited(None))
                }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            rate_limited(Some(Duration::from_millis(2)))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
