//! Message Broker Ports (Driven Ports)
//!
//! Publishing outbox rows and consuming them back for the order
//! submission worker.

use std::time::Duration;

use async_trait::async_trait;

/// Broker error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Broker unreachable.
    #[error("Broker connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Broker refused the command.
    #[error("Broker command failed: {message}")]
    Command {
        /// Error details.
        message: String,
    },

    /// Message body malformed.
    #[error("Broker message malformed: {message}")]
    Malformed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing keyed messages to a topic.
#[async_trait]
pub trait MessagePublisherPort: Send + Sync {
    /// Publish `payload` on `topic` under partition key `key`.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError>;
}

/// A message delivered to a consumer group member.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    /// Broker-assigned delivery id, used to acknowledge.
    pub delivery_id: String,
    /// Partition key.
    pub key: String,
    /// Body.
    pub payload: serde_json::Value,
}

/// Port for a consumer-group member bound to one topic.
#[async_trait]
pub trait MessageConsumerPort: Send + Sync {
    /// Wait up to `block` for at most `max` messages.
    async fn receive(
        &self,
        max: usize,
        block: Duration,
    ) -> Result<Vec<ConsumedMessage>, PublishError>;

    /// Acknowledge a processed delivery.
    async fn ack(&self, delivery_id: &str) -> Result<(), PublishError>;
}
