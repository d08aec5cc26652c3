//! Outbox dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::OutboxDispatcherConfig;
use crate::domain::outbox::RetrySchedule;

/// Outbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Pause between dispatch passes in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Age after which a PROCESSING row is reclaimed, in seconds.
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,
    /// Rows claimed per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// First retry delay in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Retry delay cap in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Attempts before a row goes DEAD.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lease_timeout_secs: default_lease_timeout_secs(),
            batch_size: default_batch_size(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl OutboxConfig {
    /// Dispatcher tuning.
    #[must_use]
    pub const fn dispatcher(&self) -> OutboxDispatcherConfig {
        OutboxDispatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            lease_timeout: Duration::from_secs(self.lease_timeout_secs),
            batch_size: self.batch_size,
            schedule: RetrySchedule {
                base_backoff: Duration::from_millis(self.base_backoff_ms),
                max_backoff: Duration::from_secs(self.max_backoff_secs),
                max_attempts: self.max_attempts,
            },
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_lease_timeout_secs() -> u64 {
    120
}

const fn default_batch_size() -> usize {
    100
}

const fn default_base_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_secs() -> u64 {
    300
}

const fn default_max_attempts() -> u32 {
    10
}
