//! Transactional Outbox
//!
//! Domain events are written to a local table in the same unit of work as
//! the mutation they announce and published asynchronously.

mod errors;
mod event;
mod payloads;
mod repository;
mod retry;

pub use errors::OutboxError;
pub use event::{OutboxEvent, OutboxStatus};
pub use payloads::{
    AggregateType, BalanceUpdatedV1, EventEnvelope, EventPayload, EventType, ExecutionRecordedV1,
    OrderSubmittedV1, OrderUpdatedV1, OrderUpdatedV2, topic_name,
};
pub use repository::{OutboxRelayStore, OutboxRepository};
pub use retry::{
    DEFAULT_BASE_BACKOFF, DEFAULT_BATCH_SIZE, DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BACKOFF, FailureDisposition, RetrySchedule, after, before,
};
