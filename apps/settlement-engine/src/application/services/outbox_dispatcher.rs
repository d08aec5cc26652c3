//! Outbox Dispatcher
//!
//! Background loop that reclaims abandoned leases, claims due rows,
//! publishes them and records the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;

use crate::application::ports::MessagePublisherPort;
use crate::domain::outbox::{
    DEFAULT_BATCH_SIZE, DEFAULT_LEASE_TIMEOUT, FailureDisposition, OutboxRelayStore,
    RetrySchedule,
};
use crate::domain::shared::OutboxEventId;
use crate::error::SettlementResult;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct OutboxDispatcherConfig {
    /// Delay between cycles.
    pub poll_interval: Duration,
    /// Lease after which a PROCESSING row is reclaimed.
    pub lease_timeout: Duration,
    /// Rows claimed per cycle.
    pub batch_size: usize,
    /// Publish retry schedule.
    pub schedule: RetrySchedule,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            schedule: RetrySchedule::default(),
        }
    }
}

/// Counts from one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Stale leases reset.
    pub reclaimed: u64,
    /// Rows claimed.
    pub claimed: usize,
    /// Rows published.
    pub published: usize,
    /// Rows scheduled for retry.
    pub failed: usize,
    /// Rows quarantined.
    pub dead: usize,
}

/// Publishes outbox rows to the broker.
pub struct OutboxDispatcher<S, P>
where
    S: OutboxRelayStore,
    P: MessagePublisherPort,
{
    store: Arc<S>,
    publisher: Arc<P>,
    config: OutboxDispatcherConfig,
}

impl<S, P> OutboxDispatcher<S, P>
where
    S: OutboxRelayStore,
    P: MessagePublisherPort,
{
    /// Create a new OutboxDispatcher.
    pub const fn new(store: Arc<S>, publisher: Arc<P>, config: OutboxDispatcherConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Run one reclaim, claim, publish cycle.
    pub async fn dispatch_once(&self) -> SettlementResult<DispatchReport> {
        let now = Utc::now();
        let mut report = DispatchReport {
            reclaimed: self
                .store
                .reclaim_stale(self.config.lease_timeout, now)
                .await?,
            ..DispatchReport::default()
        };
        if report.reclaimed > 0 {
            tracing::warn!(reclaimed = report.reclaimed, "Reclaimed stale outbox leases");
            counter!("outbox_events_reclaimed_total").increment(report.reclaimed);
        }

        let batch = self.store.claim_batch(self.config.batch_size, now).await?;
        report.claimed = batch.len();

        for mut event in batch {
            match self
                .publisher
                .publish(&event.topic, &event.partition_key, &event.payload)
                .await
            {
                Ok(()) => {
                    self.store.mark_published(&event.id, Utc::now()).await?;
                    report.published += 1;
                    counter!("outbox_events_published_total", "topic" => event.topic.clone())
                        .increment(1);
                }
                Err(err) => {
                    let message = err.to_string();
                    match event.record_failure(&message, &self.config.schedule, Utc::now()) {
                        FailureDisposition::Retry {
                            attempt_count,
                            next_attempt_at,
                        } => {
                            self.store
                                .mark_failed(&event.id, attempt_count, next_attempt_at, &message)
                                .await?;
                            report.failed += 1;
                            tracing::warn!(
                                event_id = %event.id,
                                topic = %event.topic,
                                attempt = attempt_count,
                                next_attempt_at = %next_attempt_at,
                                error = %message,
                                "Outbox publish failed, will retry"
                            );
                        }
                        FailureDisposition::Dead { attempt_count } => {
                            self.store
                                .mark_dead(&event.id, attempt_count, &message)
                                .await?;
                            report.dead += 1;
                            counter!("outbox_events_dead_total").increment(1);
                            tracing::error!(
                                event_id = %event.id,
                                topic = %event.topic,
                                attempt = attempt_count,
                                error = %message,
                                "Outbox event quarantined"
                            );
                        }
                    }
                }
            }
        }

        gauge!("outbox_last_batch_size").set(report.claimed as f64);
        Ok(report)
    }

    /// Return DEAD rows to the queue. `None` requeues all of them.
    pub async fn requeue_dead(&self, ids: Option<&[OutboxEventId]>) -> SettlementResult<u64> {
        let count = self.store.requeue_dead(ids, Utc::now()).await?;
        tracing::info!(count, "Requeued dead outbox events");
        Ok(count)
    }

    /// Dispatch on a fixed interval until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox dispatcher started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.dispatch_once().await {
                Ok(report) if report.claimed > 0 => {
                    tracing::debug!(
                        claimed = report.claimed,
                        published = report.published,
                        failed = report.failed,
                        dead = report.dead,
                        "Outbox batch dispatched"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "Outbox dispatch cycle failed");
                }
            }
        }
        tracing::info!("Outbox dispatcher stopped");
    }
}
