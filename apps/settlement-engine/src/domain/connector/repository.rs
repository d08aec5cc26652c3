//! Connector state persistence.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::health::ConnectorHealthState;
use super::replay::{ConnectorReplayRequest, ReplayEnqueueOutcome, ReplayStatus};
use crate::domain::shared::{ReplayRequestId, RepositoryError};

/// Health rows and the replay queue. Used directly against the pool.
#[async_trait]
pub trait ConnectorStateRepository: Send + Sync {
    /// Insert or overwrite a connector's health row.
    async fn upsert_health(&self, state: &ConnectorHealthState) -> Result<(), RepositoryError>;

    /// Load a connector's health row.
    async fn find_health(
        &self,
        connector_name: &str,
    ) -> Result<Option<ConnectorHealthState>, RepositoryError>;

    /// Insert `request` unless an open request for the same connector and
    /// trigger was made within `dedupe_window` of its `requested_at`.
    async fn enqueue_replay(
        &self,
        request: ConnectorReplayRequest,
        dedupe_window: Duration,
    ) -> Result<ReplayEnqueueOutcome, RepositoryError>;

    /// Claim the oldest PENDING request of a connector, marking it RUNNING.
    /// Requests locked by another worker are skipped.
    async fn claim_next_replay(
        &self,
        connector_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError>;

    /// Close a RUNNING request.
    async fn complete_replay(
        &self,
        id: &ReplayRequestId,
        status: ReplayStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Load one request.
    async fn find_replay_request(
        &self,
        id: &ReplayRequestId,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError>;
}
