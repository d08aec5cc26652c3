//! Outbox errors.

use thiserror::Error;

use super::payloads::EventType;

/// Errors raised while building outbox rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    /// Payload failed its schema checks.
    #[error("invalid {event_type} v{schema_version} payload: {message}")]
    InvalidPayload {
        /// Event type.
        event_type: EventType,
        /// Schema version.
        schema_version: u32,
        /// Failed check.
        message: String,
    },

    /// Payload could not be encoded or decoded.
    #[error("outbox payload serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for OutboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
