//! Connector resilience configuration: poller, stream and replay queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::default_true;
use crate::application::services::{
    CatchUpPollerConfig, ReconnectPolicy, StreamSupervisorConfig,
};

/// Connector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Catch-up poller.
    #[serde(default)]
    pub poller: PollerConfig,
    /// Push stream.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Replay queue.
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Catch-up poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Run the poller.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// How far back trades are fetched, in seconds.
    #[serde(default = "default_trade_lookback_secs")]
    pub trade_lookback_secs: u64,
    /// Seconds without a successful poll before the connector is DOWN.
    #[serde(default = "default_down_threshold_secs")]
    pub down_threshold_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval_secs(),
            trade_lookback_secs: default_trade_lookback_secs(),
            down_threshold_secs: default_down_threshold_secs(),
        }
    }
}

impl PollerConfig {
    /// Poller tuning for `exchange_name`.
    #[must_use]
    pub fn poller(&self, exchange_name: &str) -> CatchUpPollerConfig {
        CatchUpPollerConfig {
            exchange_name: exchange_name.to_string(),
            interval: Duration::from_secs(self.interval_secs),
            trade_lookback: Duration::from_secs(self.trade_lookback_secs),
        }
    }

    /// Health DOWN threshold.
    #[must_use]
    pub const fn down_threshold(&self) -> Duration {
        Duration::from_secs(self.down_threshold_secs)
    }
}

/// Push-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Run the stream supervisor.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Connection age in seconds after which reconnect backoff resets.
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// First reconnect delay ceiling in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Reconnect delay cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Listen-key keepalive period in seconds.
    #[serde(default = "default_keepalive_secs")]
    pub listen_key_keepalive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stable_after_secs: default_stable_after_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            listen_key_keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl StreamConfig {
    /// Supervisor tuning for `exchange_name`.
    #[must_use]
    pub fn supervisor(&self, exchange_name: &str, replay: &ReplayConfig) -> StreamSupervisorConfig {
        StreamSupervisorConfig {
            exchange_name: exchange_name.to_string(),
            stable_after: Duration::from_secs(self.stable_after_secs),
            replay_dedupe_window: replay.dedupe_window(),
            reconnect: ReconnectPolicy {
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                multiplier: self.multiplier,
            },
        }
    }

    /// Listen-key keepalive period.
    #[must_use]
    pub const fn listen_key_keepalive(&self) -> Duration {
        Duration::from_secs(self.listen_key_keepalive_secs)
    }
}

/// Replay queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Window in seconds inside which an open request absorbs new ones.
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: u64,
    /// Seconds between queue polls.
    #[serde(default = "default_replay_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dedupe_window_secs: default_dedupe_window_secs(),
            poll_interval_secs: default_replay_poll_secs(),
        }
    }
}

impl ReplayConfig {
    /// Deduplication window.
    #[must_use]
    pub const fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.dedupe_window_secs)
    }

    /// Queue poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_trade_lookback_secs() -> u64 {
    3_600
}

const fn default_down_threshold_secs() -> u64 {
    120
}

const fn default_stable_after_secs() -> u64 {
    60
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_keepalive_secs() -> u64 {
    1_800
}

const fn default_dedupe_window_secs() -> u64 {
    60
}

const fn default_replay_poll_secs() -> u64 {
    5
}
