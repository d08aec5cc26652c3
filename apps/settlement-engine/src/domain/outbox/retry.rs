//! Publish retry schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default lease after which a PROCESSING row is considered abandoned.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(120);
/// Default claim batch size.
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default attempts before a row is quarantined.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default first retry delay.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Default retry delay cap.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// What to do with a row whose publish just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Try again at `next_attempt_at`.
    Retry {
        /// Attempts made so far.
        attempt_count: u32,
        /// Earliest next attempt.
        next_attempt_at: DateTime<Utc>,
    },
    /// Quarantine the row.
    Dead {
        /// Attempts made so far.
        attempt_count: u32,
    },
}

/// Exponential publish backoff bounded by a cap and an attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Delay after the first failure.
    pub base_backoff: Duration,
    /// Delay cap.
    pub max_backoff: Duration,
    /// Attempts before the row goes DEAD.
    pub max_attempts: u32,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetrySchedule {
    /// Delay after `attempt` failures: `min(base * 2^(attempt-1), max)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Decide the fate of a row that has now failed `attempt_count` times.
    #[must_use]
    pub fn on_failure(&self, attempt_count: u32, now: DateTime<Utc>) -> FailureDisposition {
        if attempt_count >= self.max_attempts {
            FailureDisposition::Dead { attempt_count }
        } else {
            FailureDisposition::Retry {
                attempt_count,
                next_attempt_at: after(now, self.backoff(attempt_count)),
            }
        }
    }
}

/// `now + delay`, saturating at the largest representable instant.
#[must_use]
pub fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - delay`, saturating at the smallest representable instant.
#[must_use]
pub fn before(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 1)]
    #[test_case(2, 2)]
    #[test_case(3, 4)]
    #[test_case(9, 256)]
    #[test_case(10, 300)]
    #[test_case(64, 300)]
    fn backoff_doubles_up_to_cap(attempt: u32, seconds: u64) {
        assert_eq!(
            RetrySchedule::default().backoff(attempt),
            Duration::from_secs(seconds)
        );
    }

    #[test]
    fn row_goes_dead_at_max_attempts() {
        let schedule = RetrySchedule {
            max_attempts: 3,
            ..RetrySchedule::default()
        };
        let now = Utc::now();

        assert_eq!(
            schedule.on_failure(2, now),
            FailureDisposition::Retry {
                attempt_count: 2,
                next_attempt_at: now + chrono::Duration::seconds(2),
            }
        );
        assert_eq!(
            schedule.on_failure(3, now),
            FailureDisposition::Dead { attempt_count: 3 }
        );
    }
}
