//! Request Replay Use Case
//!
//! Operator trigger for a reconciliation replay.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::connector::{
    ConnectorReplayRequest, ConnectorStateRepository, ReplayEnqueueOutcome, ReplayTrigger,
};
use crate::domain::shared::ReplayRequestId;
use crate::error::{SettlementError, SettlementResult};

/// Use case for manual replays.
pub struct RequestReplayUseCase {
    connector_store: Arc<dyn ConnectorStateRepository>,
    connectors: BTreeSet<String>,
    default_connector: String,
    dedupe_window: Duration,
}

impl RequestReplayUseCase {
    /// Create a new RequestReplayUseCase.
    ///
    /// `default_connector` is used when a request names none.
    pub fn new(
        connector_store: Arc<dyn ConnectorStateRepository>,
        connectors: impl IntoIterator<Item = String>,
        default_connector: impl Into<String>,
        dedupe_window: Duration,
    ) -> Self {
        Self {
            connector_store,
            connectors: connectors.into_iter().collect(),
            default_connector: default_connector.into(),
            dedupe_window,
        }
    }

    /// Queue a MANUAL replay.
    ///
    /// # Errors
    ///
    /// `UnknownConnector` if the connector is not configured.
    pub async fn execute(
        &self,
        connector_name: Option<&str>,
        reason: Option<String>,
        requested_by: Option<String>,
    ) -> SettlementResult<ReplayEnqueueOutcome> {
        let connector = connector_name.unwrap_or(&self.default_connector);
        if !self.connectors.contains(connector) {
            return Err(SettlementError::UnknownConnector(connector.to_string()));
        }

        let request = ConnectorReplayRequest::pending(
            connector,
            ReplayTrigger::Manual,
            reason,
            requested_by,
            Utc::now(),
        );
        let outcome = self
            .connector_store
            .enqueue_replay(request, self.dedupe_window)
            .await?;
        tracing::info!(
            connector,
            replay_id = %outcome.request().id,
            deduplicated = matches!(outcome, ReplayEnqueueOutcome::Deduplicated(_)),
            "Manual replay requested"
        );
        Ok(outcome)
    }

    /// Load a request for status polling.
    pub async fn status(&self, id: &ReplayRequestId) -> SettlementResult<ConnectorReplayRequest> {
        self.connector_store
            .find_replay_request(id)
            .await?
            .ok_or_else(|| SettlementError::ReplayNotFound(id.to_string()))
    }

    /// Configured connector names.
    pub fn connectors(&self) -> impl Iterator<Item = &str> {
        self.connectors.iter().map(String::as_str)
    }
}
