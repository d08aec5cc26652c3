//! Exchange connector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::ExchangeRetryPolicy;
use crate::infrastructure::exchange::binance::{BinanceConfig, BinanceEnvironment};

/// Exchange configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Connector name used in executions, health rows and replay requests.
    #[serde(default = "default_exchange_name")]
    pub name: String,
    /// `testnet` or `production`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// REST base URL override.
    #[serde(default)]
    pub rest_base_url: Option<String>,
    /// WebSocket base URL override.
    #[serde(default)]
    pub ws_base_url: Option<String>,
    /// Signed request validity window in milliseconds.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Rate-limit retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: default_exchange_name(),
            environment: default_environment(),
            api_key: String::new(),
            api_secret: String::new(),
            rest_base_url: None,
            ws_base_url: None,
            recv_window_ms: default_recv_window_ms(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// Parsed environment.
    pub fn environment(&self) -> Result<BinanceEnvironment, String> {
        self.environment.parse()
    }

    /// Whether both credentials are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Adapter configuration.
    ///
    /// `listen_key_keepalive` comes from the stream section.
    pub fn binance(&self, listen_key_keepalive: Duration) -> Result<BinanceConfig, String> {
        let mut config = BinanceConfig::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.environment()?,
        )
        .with_recv_window(Duration::from_millis(self.recv_window_ms))
        .with_timeout(Duration::from_millis(self.timeout_ms))
        .with_listen_key_keepalive(listen_key_keepalive);
        if let Some(url) = &self.rest_base_url {
            config = config.with_rest_base_url(url.clone());
        }
        if let Some(url) = &self.ws_base_url {
            config = config.with_ws_base_url(url.clone());
        }
        Ok(config)
    }
}

/// Retry of rate-limited and transient exchange calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth per attempt.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the delay.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Executor policy.
    #[must_use]
    pub const fn policy(&self) -> ExchangeRetryPolicy {
        ExchangeRetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

fn default_exchange_name() -> String {
    "binance".to_string()
}

fn default_environment() -> String {
    "testnet".to_string()
}

const fn default_recv_window_ms() -> u64 {
    5_000
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.2
}
