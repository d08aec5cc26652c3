//! Broker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::OrderSubmissionWorkerConfig;

/// Which broker carries outbox events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingBackend {
    /// Redis Streams.
    #[default]
    Redis,
    /// Process-local broker.
    Memory,
}

/// Messaging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Broker backend.
    #[serde(default)]
    pub backend: MessagingBackend,
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Prefix of every topic name.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Approximate stream length cap (`MAXLEN ~`); unbounded when absent.
    #[serde(default)]
    pub stream_max_len: Option<usize>,
    /// Consumer group of the order-submission worker.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Consumer name inside the group.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    /// Messages per receive.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Longest blocking read in milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Pause after a failed delivery in milliseconds.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            backend: MessagingBackend::default(),
            redis_url: default_redis_url(),
            topic_prefix: default_topic_prefix(),
            stream_max_len: None,
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

impl MessagingConfig {
    /// Order-submission worker tuning.
    #[must_use]
    pub const fn submission_worker(&self) -> OrderSubmissionWorkerConfig {
        OrderSubmissionWorkerConfig {
            batch_size: self.batch_size,
            block: Duration::from_millis(self.block_ms),
            failure_backoff: Duration::from_millis(self.failure_backoff_ms),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_topic_prefix() -> String {
    "settlement".to_string()
}

fn default_consumer_group() -> String {
    "order-submission".to_string()
}

fn default_consumer_name() -> String {
    "settlement-engine-1".to_string()
}

const fn default_batch_size() -> usize {
    16
}

const fn default_block_ms() -> u64 {
    2_000
}

const fn default_failure_backoff_ms() -> u64 {
    1_000
}
