//! Outbox rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OutboxError;
use super::payloads::{AggregateType, EventEnvelope, EventPayload, EventType, topic_name};
use super::retry::{FailureDisposition, RetrySchedule};
use crate::domain::shared::OutboxEventId;

code_enum! {
    /// Delivery status of an outbox row.
    pub enum OutboxStatus("outbox_status") {
        /// Waiting for its first attempt.
        New => "NEW",
        /// Leased by a dispatcher.
        Processing => "PROCESSING",
        /// Delivered.
        Published => "PUBLISHED",
        /// Last attempt failed; retried at `next_attempt_at`.
        Failed => "FAILED",
        /// Quarantined after too many failures.
        Dead => "DEAD",
    }
}

impl OutboxStatus {
    /// Whether a dispatcher may claim a row in this status.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        matches!(self, Self::New | Self::Failed)
    }
}

/// A not-yet-delivered (or delivered) domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Row identifier.
    pub id: OutboxEventId,
    /// Aggregate kind.
    pub aggregate_type: AggregateType,
    /// Aggregate id.
    pub aggregate_id: String,
    /// Event family.
    pub event_type: EventType,
    /// Schema version.
    pub schema_version: u32,
    /// Serialized [`EventEnvelope`].
    pub payload: serde_json::Value,
    /// Broker topic.
    pub topic: String,
    /// Broker partition key.
    pub partition_key: String,
    /// Delivery status.
    pub status: OutboxStatus,
    /// Failed publish attempts.
    pub attempt_count: u32,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Earliest next attempt.
    pub next_attempt_at: DateTime<Utc>,
    /// Lease start while PROCESSING.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Delivery time.
    pub published_at: Option<DateTime<Utc>>,
    /// Last publish error.
    pub last_error: Option<String>,
}

impl OutboxEvent {
    /// Validate `payload` and wrap it into a NEW row.
    ///
    /// # Errors
    ///
    /// Returns error if the payload fails validation or serialization.
    pub fn from_payload<P: EventPayload>(
        topic_prefix: &str,
        payload: &P,
        now: DateTime<Utc>,
    ) -> Result<Self, OutboxError> {
        payload.validate()?;

        let id = OutboxEventId::generate();
        let natural_key = payload.natural_key();
        let envelope = EventEnvelope {
            event_id: id.clone(),
            event_type: P::EVENT_TYPE,
            schema_version: P::SCHEMA_VERSION,
            correlation_id: natural_key.clone(),
            occurred_at: now,
            payload,
        };

        Ok(Self {
            id,
            aggregate_type: P::AGGREGATE_TYPE,
            aggregate_id: payload.aggregate_id(),
            event_type: P::EVENT_TYPE,
            schema_version: P::SCHEMA_VERSION,
            payload: serde_json::to_value(&envelope)?,
            topic: topic_name(topic_prefix, P::EVENT_TYPE, P::SCHEMA_VERSION),
            partition_key: natural_key,
            status: OutboxStatus::New,
            attempt_count: 0,
            created_at: now,
            next_attempt_at: now,
            processing_started_at: None,
            published_at: None,
            last_error: None,
        })
    }

    /// Decode the envelope back into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns error if the stored JSON does not match `P`.
    pub fn decode<P: EventPayload>(&self) -> Result<EventEnvelope<P>, OutboxError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Mark leased by a dispatcher.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Processing;
        self.processing_started_at = Some(now);
    }

    /// Mark delivered, clearing the lease and the last error.
    pub fn mark_published(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Published;
        self.published_at = Some(now);
        self.processing_started_at = None;
        self.last_error = None;
    }

    /// Record a failed attempt and schedule a retry or quarantine.
    pub fn record_failure(
        &mut self,
        error: &str,
        schedule: &RetrySchedule,
        now: DateTime<Utc>,
    ) -> FailureDisposition {
        let disposition = schedule.on_failure(self.attempt_count.saturating_add(1), now);
        match disposition {
            FailureDisposition::Retry {
                attempt_count,
                next_attempt_at,
            } => {
                self.status = OutboxStatus::Failed;
                self.attempt_count = attempt_count;
                self.next_attempt_at = next_attempt_at;
            }
            FailureDisposition::Dead { attempt_count } => {
                self.status = OutboxStatus::Dead;
                self.attempt_count = attempt_count;
            }
        }
        self.processing_started_at = None;
        self.last_error = Some(error.to_string());
        disposition
    }

    /// Return an abandoned lease to the retry pool.
    pub fn reclaim(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Failed;
        self.processing_started_at = None;
        self.next_attempt_at = now;
    }

    /// Put a quarantined row back in the queue with its attempt count reset.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::New;
        self.attempt_count = 0;
        self.next_attempt_at = now;
        self.processing_started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outbox::payloads::OrderUpdatedV1;
    use crate::domain::order_lifecycle::OrderStatus;
    use crate::domain::shared::{AccountId, OrderId};
    use rust_decimal_macros::dec;

    fn event() -> OutboxEvent {
        let payload = OrderUpdatedV1 {
            order_id: OrderId::new("o-1"),
            account_id: AccountId::new("a-1"),
            status: OrderStatus::Acknowledged,
            filled_quantity: dec!(0),
            updated_at: Utc::now(),
        };
        OutboxEvent::from_payload("settlement", &payload, Utc::now()).unwrap()
    }

    #[test]
    fn new_row_is_keyed_and_routed() {
        let event = event();
        assert_eq!(event.status, OutboxStatus::New);
        assert_eq!(event.topic, "settlement.order-updated.v1");
        assert_eq!(event.partition_key, "o-1");
        assert_eq!(event.next_attempt_at, event.created_at);

        let envelope = event.decode::<OrderUpdatedV1>().unwrap();
        assert_eq!(envelope.event_id, event.id);
        assert_eq!(envelope.correlation_id, "o-1");
    }

    #[test]
    fn failures_escalate_to_dead() {
        let schedule = RetrySchedule {
            max_attempts: 2,
            ..RetrySchedule::default()
        };
        let mut event = event();
        let now = Utc::now();

        event.mark_processing(now);
        event.record_failure("broker down", &schedule, now);
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempt_count, 1);
        assert!(event.next_attempt_at > now);

        event.mark_processing(now);
        event.record_failure("broker down", &schedule, now);
        assert_eq!(event.status, OutboxStatus::Dead);
        assert_eq!(event.last_error.as_deref(), Some("broker down"));

        event.requeue(now);
        assert_eq!(event.status, OutboxStatus::New);
        assert_eq!(event.attempt_count, 0);
    }
}
