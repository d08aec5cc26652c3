//! Connector health snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::IngestOutcome;
use crate::domain::outbox::before;

code_enum! {
    /// Overall connector status.
    pub enum ConnectorStatus("connector_status") {
        /// Polls succeed.
        Up => "UP",
        /// The latest cycle failed but a recent one succeeded.
        Degraded => "DEGRADED",
        /// No success within the threshold.
        Down => "DOWN",
    }
}

code_enum! {
    /// Push-stream connection state.
    pub enum WebsocketState("websocket_state") {
        /// Session established.
        Up => "UP",
        /// Session dropped; reconnect pending.
        Degraded => "DEGRADED",
        /// Connect in progress.
        Connecting => "CONNECTING",
        /// Connect failed or stream stopped.
        Down => "DOWN",
    }
}

/// Health row of one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorHealthState {
    /// Connector name (the exchange name).
    pub connector_name: String,
    /// Derived status.
    pub status: ConnectorStatus,
    /// Last successful poll cycle.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last poll cycle, successful or not.
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Last recorded error.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Code of the last error.
    pub last_error_code: Option<String>,
    /// Message of the last error.
    pub last_error_message: Option<String>,
    /// Open orders fetched by the last successful cycle.
    pub open_orders_fetched: u64,
    /// Trades fetched by the last successful cycle.
    pub trades_fetched: u64,
    /// Push-stream state.
    pub websocket_state: WebsocketState,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Stream fills applied.
    pub stream_fills_inserted: u64,
    /// Stream fills already ingested.
    pub stream_fills_duplicate: u64,
    /// Stream fills with no local order.
    pub stream_fills_unmapped: u64,
    /// Stream frames that failed to decode or apply.
    pub stream_errors: u64,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl ConnectorHealthState {
    /// Initial row: nothing has succeeded yet.
    #[must_use]
    pub fn new(connector_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            connector_name: connector_name.into(),
            status: ConnectorStatus::Down,
            last_success_at: None,
            last_poll_at: None,
            last_error_at: None,
            last_error_code: None,
            last_error_message: None,
            open_orders_fetched: 0,
            trades_fetched: 0,
            websocket_state: WebsocketState::Down,
            reconnect_attempts: 0,
            stream_fills_inserted: 0,
            stream_fills_duplicate: 0,
            stream_fills_unmapped: 0,
            stream_errors: 0,
            updated_at: now,
        }
    }

    /// Status from timestamps alone.
    ///
    /// DOWN if nothing ever succeeded or the last success is older than
    /// `threshold`, DEGRADED if an error followed the last success, else UP.
    #[must_use]
    pub fn derive_status(&self, threshold: Duration, now: DateTime<Utc>) -> ConnectorStatus {
        let Some(last_success) = self.last_success_at else {
            return ConnectorStatus::Down;
        };
        if last_success < before(now, threshold) {
            return ConnectorStatus::Down;
        }
        match self.last_error_at {
            Some(last_error) if last_error > last_success => ConnectorStatus::Degraded,
            _ => ConnectorStatus::Up,
        }
    }

    /// Record a successful poll cycle.
    pub fn record_poll_success(
        &mut self,
        open_orders: u64,
        trades: u64,
        threshold: Duration,
        now: DateTime<Utc>,
    ) {
        self.last_poll_at = Some(now);
        self.last_success_at = Some(now);
        self.open_orders_fetched = open_orders;
        self.trades_fetched = trades;
        self.refresh(threshold, now);
    }

    /// Record a cycle that reached the exchange but could not apply
    /// everything it fetched. The last success is not advanced.
    pub fn record_poll_incomplete(
        &mut self,
        open_orders: u64,
        trades: u64,
        code: &str,
        message: &str,
        threshold: Duration,
        now: DateTime<Utc>,
    ) {
        self.last_poll_at = Some(now);
        self.open_orders_fetched = open_orders;
        self.trades_fetched = trades;
        self.record_error(code, message, now);
        self.refresh(threshold, now);
    }

    /// Record a failed poll cycle.
    pub fn record_poll_failure(
        &mut self,
        code: &str,
        message: &str,
        threshold: Duration,
        now: DateTime<Utc>,
    ) {
        self.last_poll_at = Some(now);
        self.record_error(code, message, now);
        self.refresh(threshold, now);
    }

    /// Record a stream-side error without touching poll timestamps.
    pub fn record_error(&mut self, code: &str, message: &str, now: DateTime<Utc>) {
        self.last_error_at = Some(now);
        self.last_error_code = Some(code.to_string());
        self.last_error_message = Some(message.to_string());
        self.updated_at = now;
    }

    /// Record a websocket state change.
    pub fn record_websocket_state(
        &mut self,
        state: WebsocketState,
        reconnect_attempts: u32,
        now: DateTime<Utc>,
    ) {
        self.websocket_state = state;
        self.reconnect_attempts = reconnect_attempts;
        self.updated_at = now;
    }

    /// Count one stream fill outcome.
    pub fn record_stream_outcome(&mut self, outcome: &IngestOutcome, now: DateTime<Utc>) {
        match outcome {
            IngestOutcome::Inserted { .. } => self.stream_fills_inserted += 1,
            IngestOutcome::Duplicate => self.stream_fills_duplicate += 1,
            IngestOutcome::Unmapped => self.stream_fills_unmapped += 1,
        }
        self.updated_at = now;
    }

    /// Count one stream frame that could not be applied.
    pub fn record_stream_error(&mut self, code: &str, message: &str, now: DateTime<Utc>) {
        self.stream_errors += 1;
        self.record_error(code, message, now);
    }

    fn refresh(&mut self, threshold: Duration, now: DateTime<Utc>) {
        self.status = self.derive_status(threshold, now);
        self.updated_at = now;
    }
}
