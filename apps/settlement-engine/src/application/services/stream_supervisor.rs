//! Stream Supervisor
//!
//! Keeps one push-stream session alive, feeds its events into ingestion
//! and reconnects with full-jitter backoff. Every lifecycle change lands
//! in connector health, and every failure queues a RECOVERY replay so the
//! poller covers whatever the stream missed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::connector_health::ConnectorHealthHandle;
use super::execution_ingestion::ExecutionIngestionService;
use crate::application::ports::{
    ExecutionStreamPort, StreamError, StreamEvent, StreamSession, TransactionManager,
};
use crate::domain::connector::{
    ConnectorReplayRequest, ConnectorStateRepository, ReplayEnqueueOutcome, ReplayTrigger,
    WebsocketState,
};
use crate::domain::execution::{ExecutionReport, IngestOutcome};

/// Reconnect backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// First delay ceiling.
    pub initial_backoff: Duration,
    /// Delay ceiling cap.
    pub max_backoff: Duration,
    /// Growth per attempt.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Full-jitter exponential backoff: each delay is uniform in
/// `[0, min(initial * multiplier^attempt, max))`.
#[derive(Debug)]
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    current_attempt: u32,
}

impl ReconnectBackoff {
    /// Start at attempt zero.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current_attempt: 0,
        }
    }

    /// Next delay; the attempt counter grows without bound.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_backoff(&mut self) -> Duration {
        let base_ms = self.policy.initial_backoff.as_millis() as f64;
        let exponential = base_ms
            * self
                .policy
                .multiplier
                .powi(i32::try_from(self.current_attempt).unwrap_or(i32::MAX));
        let capped = exponential.min(self.policy.max_backoff.as_millis() as f64);
        self.current_attempt = self.current_attempt.saturating_add(1);

        if capped < 1.0 {
            return Duration::ZERO;
        }
        let jitter = rand::rng().random_range(0.0..capped);
        Duration::from_millis(jitter as u64)
    }

    /// Back to attempt zero after a stable connection.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Consecutive attempts so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct StreamSupervisorConfig {
    /// Exchange name the stream belongs to.
    pub exchange_name: String,
    /// Connection age after which backoff resets.
    pub stable_after: Duration,
    /// Window inside which recovery replays are deduplicated.
    pub replay_dedupe_window: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
}

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    ClosedByServer,
    Failed(StreamError),
}

/// Maintains the push stream of one connector.
pub struct StreamSupervisor<T, S>
where
    T: TransactionManager,
    S: ExecutionStreamPort,
{
    stream: Arc<S>,
    ingestion: Arc<ExecutionIngestionService<T>>,
    connector_store: Arc<dyn ConnectorStateRepository>,
    health: ConnectorHealthHandle,
    config: StreamSupervisorConfig,
}

impl<T, S> StreamSupervisor<T, S>
where
    T: TransactionManager,
    S: ExecutionStreamPort,
{
    /// Create a new StreamSupervisor.
    pub fn new(
        stream: Arc<S>,
        ingestion: Arc<ExecutionIngestionService<T>>,
        connector_store: Arc<dyn ConnectorStateRepository>,
        health: ConnectorHealthHandle,
        config: StreamSupervisorConfig,
    ) -> Self {
        Self {
            stream,
            ingestion,
            connector_store,
            health,
            config,
        }
    }

    /// Shared health handle.
    #[must_use]
    pub const fn health(&self) -> &ConnectorHealthHandle {
        &self.health
    }

    /// Connect, consume and reconnect until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let exchange = self.config.exchange_name.as_str();
        let mut backoff = ReconnectBackoff::new(self.config.reconnect.clone());
        tracing::info!(exchange, "Stream supervisor started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let attempts = backoff.current_attempt();
            self.health
                .update(|h| {
                    h.record_websocket_state(WebsocketState::Connecting, attempts, Utc::now());
                })
                .await;

            let opened = tokio::select! {
                () = shutdown.cancelled() => break,
                opened = self.stream.open() => opened,
            };

            match opened {
                Ok(session) => {
                    tracing::info!(exchange, "Stream connected");
                    self.health
                        .update(|h| {
                            h.record_websocket_state(WebsocketState::Up, attempts, Utc::now());
                        })
                        .await;

                    let connected_at = Instant::now();
                    let end = self.consume(session, &shutdown).await;
                    if connected_at.elapsed() >= self.config.stable_after {
                        backoff.reset();
                    }

                    let (code, message) = match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::ClosedByServer => {
                            ("STREAM_CLOSED", "stream closed by server".to_string())
                        }
                        SessionEnd::Failed(err) => (err.code(), err.to_string()),
                    };
                    tracing::warn!(exchange, code, error = %message, "Stream session ended");
                    let attempts = backoff.current_attempt();
                    self.health
                        .update(|h| {
                            let now = Utc::now();
                            h.record_websocket_state(WebsocketState::Degraded, attempts, now);
                            h.record_error(code, &message, now);
                        })
                        .await;
                    self.request_recovery(&message).await;
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(exchange, error = %message, "Stream connect failed");
                    self.health
                        .update(|h| {
                            let now = Utc::now();
                            h.record_websocket_state(WebsocketState::Down, attempts, now);
                            h.record_error(err.code(), &message, now);
                        })
                        .await;
                    self.request_recovery(&message).await;
                }
            }

            let delay = backoff.next_backoff();
            counter!("connector_reconnects_total", "connector" => self.config.exchange_name.clone())
                .increment(1);
            tracing::info!(
                exchange,
                attempt = backoff.current_attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting stream"
            );
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        let attempts = backoff.current_attempt();
        self.health
            .update(|h| h.record_websocket_state(WebsocketState::Down, attempts, Utc::now()))
            .await;
        tracing::info!(exchange, "Stream supervisor stopped");
    }

    async fn consume(&self, mut session: S::Session, shutdown: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => None,
                event = session.next_event() => Some(event),
            };
            let Some(event) = next else {
                if let Err(err) = session.close().await {
                    tracing::warn!(error = %err, "Stream close failed during shutdown");
                }
                return SessionEnd::Cancelled;
            };

            match event {
                None => return SessionEnd::ClosedByServer,
                Some(Ok(StreamEvent::Execution(report))) => self.on_fill(&report).await,
                Some(Ok(StreamEvent::Status(report))) => {
                    if let Err(err) = self.ingestion.process_status_report(&report).await {
                        self.on_apply_error(&err.to_string()).await;
                    }
                }
                Some(Ok(StreamEvent::Ignored)) => {}
                Some(Err(err)) if err.is_recoverable() => {
                    tracing::warn!(error = %err, "Skipping undecodable stream frame");
                    let message = err.to_string();
                    self.health
                        .update(|h| h.record_stream_error(err.code(), &message, Utc::now()))
                        .await;
                }
                Some(Err(err)) => {
                    if let Err(close_err) = session.close().await {
                        tracing::debug!(error = %close_err, "Stream close after failure");
                    }
                    return SessionEnd::Failed(err);
                }
            }
        }
    }

    async fn on_fill(&self, report: &ExecutionReport) {
        match self.ingestion.process_fill(report).await {
            Ok(outcome) => {
                self.health
                    .update(|h| h.record_stream_outcome(&outcome, Utc::now()))
                    .await;
                if outcome == IngestOutcome::Unmapped {
                    self.request_recovery(&format!(
                        "unmapped stream fill {} on {}",
                        report.trade_id, report.instrument
                    ))
                    .await;
                }
            }
            Err(err) => self.on_apply_error(&err.to_string()).await,
        }
    }

    async fn on_apply_error(&self, message: &str) {
        tracing::warn!(
            exchange = %self.config.exchange_name,
            error = message,
            "Stream event could not be applied"
        );
        self.health
            .update(|h| h.record_stream_error("STREAM_APPLY", message, Utc::now()))
            .await;
    }

    async fn request_recovery(&self, reason: &str) {
        let request = ConnectorReplayRequest::pending(
            self.config.exchange_name.clone(),
            ReplayTrigger::Recovery,
            Some(reason.to_string()),
            Some("stream-supervisor".to_string()),
            Utc::now(),
        );
        match self
            .connector_store
            .enqueue_replay(request, self.config.replay_dedupe_window)
            .await
        {
            Ok(ReplayEnqueueOutcome::Enqueued(request)) => {
                tracing::info!(replay_id = %request.id, reason, "Recovery replay queued");
            }
            Ok(ReplayEnqueueOutcome::Deduplicated(_)) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to queue recovery replay");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(initial_ms),
            max_backoff: Duration::from_millis(max_ms),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_stay_under_the_exponential_ceiling() {
        let mut backoff = ReconnectBackoff::new(policy(100, 10_000));
        assert!(backoff.next_backoff() <= Duration::from_millis(100));
        assert!(backoff.next_backoff() <= Duration::from_millis(200));
        assert!(backoff.next_backoff() <= Duration::from_millis(400));
        assert_eq!(backoff.current_attempt(), 3);
    }

    #[test]
    fn delays_are_capped() {
        let mut backoff = ReconnectBackoff::new(policy(1_000, 5_000));
        for _ in 0..20 {
            assert!(backoff.next_backoff() <= Duration::from_millis(5_000));
        }
    }

    #[test]
    fn reset_returns_to_first_attempt() {
        let mut backoff = ReconnectBackoff::new(policy(100, 1_000));
        let _ = backoff.next_backoff();
        let _ = backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.current_attempt(), 0);
    }

    #[test]
    fn zero_initial_backoff_never_sleeps() {
        let mut backoff = ReconnectBackoff::new(policy(0, 1_000));
        assert_eq!(backoff.next_backoff(), Duration::ZERO);
    }
}
