//! Replay Worker
//!
//! Drains the replay queue of one connector: claims the oldest PENDING
//! request, runs a catch-up cycle for it and records the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::catch_up_poller::CatchUpPoller;
use crate::application::ports::TransactionManager;
use crate::domain::connector::{ConnectorReplayRequest, ConnectorStateRepository, ReplayStatus};
use crate::error::SettlementResult;

/// Executes queued replay requests.
pub struct ReplayWorker<T>
where
    T: TransactionManager,
{
    connector_store: Arc<dyn ConnectorStateRepository>,
    poller: Arc<CatchUpPoller<T>>,
    poll_interval: Duration,
}

impl<T> ReplayWorker<T>
where
    T: TransactionManager,
{
    /// Create a new ReplayWorker.
    pub fn new(
        connector_store: Arc<dyn ConnectorStateRepository>,
        poller: Arc<CatchUpPoller<T>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connector_store,
            poller,
            poll_interval,
        }
    }

    /// Claim and execute at most one request.
    ///
    /// Returns the request with its final status, or `None` if the queue
    /// was empty.
    pub async fn run_once(&self) -> SettlementResult<Option<ConnectorReplayRequest>> {
        let connector = self.poller.exchange_name();
        let Some(request) = self
            .connector_store
            .claim_next_replay(connector, Utc::now())
            .await?
        else {
            return Ok(None);
        };

        tracing::info!(
            replay_id = %request.id,
            connector,
            trigger = %request.trigger,
            reason = request.reason.as_deref(),
            "Replay started"
        );

        let (status, error) = match self.poller.run_cycle().await {
            Ok(report) if !report.is_complete() => {
                let summary = report.failure_summary();
                tracing::warn!(replay_id = %request.id, failed = report.failed, "Replay incomplete");
                (ReplayStatus::Failed, Some(summary))
            }
            Ok(report) => {
                tracing::info!(
                    replay_id = %request.id,
                    trades = report.trades,
                    inserted = report.inserted,
                    "Replay succeeded"
                );
                (ReplayStatus::Succeeded, None)
            }
            Err(err) => {
                tracing::warn!(replay_id = %request.id, error = %err, "Replay failed");
                (ReplayStatus::Failed, Some(err.to_string()))
            }
        };

        self.connector_store
            .complete_replay(&request.id, status, error.as_deref(), Utc::now())
            .await?;
        Ok(self.connector_store.find_replay_request(&request.id).await?)
    }

    /// Poll the queue until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(connector = self.poller.exchange_name(), "Replay worker started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            // Drain everything queued before waiting again.
            loop {
                match self.run_once().await {
                    Ok(Some(_)) if !shutdown.is_cancelled() => {}
                    Ok(_) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "Replay worker cycle failed");
                        break;
                    }
                }
            }
        }
        tracing::info!(connector = self.poller.exchange_name(), "Replay worker stopped");
    }
}
