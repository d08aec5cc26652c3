//! Outbox persistence traits.
//!
//! Enqueueing happens inside the caller's unit of work. Dispatch runs
//! against the pool and never shares a transaction with domain writes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::event::OutboxEvent;
use crate::domain::shared::{OutboxEventId, RepositoryError};

/// Enqueue side, scoped to a unit of work.
#[async_trait]
pub trait OutboxRepository: Send {
    /// Insert a NEW row.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    async fn enqueue_outbox(&mut self, event: &OutboxEvent) -> Result<(), RepositoryError>;

    /// Rows announcing changes to one aggregate, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list_outbox_for_aggregate(
        &mut self,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError>;
}

/// Dispatch side, used by the relay loop.
#[async_trait]
pub trait OutboxRelayStore: Send + Sync {
    /// Reset PROCESSING rows leased before `now - lease` to FAILED with
    /// `next_attempt_at = now`. Returns the number reclaimed.
    async fn reclaim_stale(
        &self,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Atomically lease up to `limit` due NEW/FAILED rows, oldest first,
    /// skipping rows locked by another dispatcher.
    async fn claim_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, RepositoryError>;

    /// Mark a row delivered.
    async fn mark_published(
        &self,
        id: &OutboxEventId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Record a failed attempt; the row stays FAILED until `next_attempt_at`.
    async fn mark_failed(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError>;

    /// Quarantine a row.
    async fn mark_dead(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        error: &str,
    ) -> Result<(), RepositoryError>;

    /// Return DEAD rows to NEW with its attempt count reset. `None` requeues
    /// every DEAD row. Returns the number requeued.
    async fn requeue_dead(
        &self,
        ids: Option<&[OutboxEventId]>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Load one row.
    async fn find_outbox_event(
        &self,
        id: &OutboxEventId,
    ) -> Result<Option<OutboxEvent>, RepositoryError>;
}
