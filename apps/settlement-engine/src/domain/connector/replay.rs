//! Connector replay requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::ReplayRequestId;

code_enum! {
    /// Who asked for the replay.
    pub enum ReplayTrigger("replay_trigger") {
        /// Operator request.
        Manual => "MANUAL",
        /// Enqueued after a stream failure or unmapped fill.
        Recovery => "RECOVERY",
    }
}

code_enum! {
    /// Replay request status.
    pub enum ReplayStatus("replay_status") {
        /// Waiting for a worker.
        Pending => "PENDING",
        /// Claimed by a worker.
        Running => "RUNNING",
        /// Catch-up cycle completed.
        Succeeded => "SUCCEEDED",
        /// Catch-up cycle failed.
        Failed => "FAILED",
    }
}

impl ReplayStatus {
    /// PENDING or RUNNING.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// A queued request to re-run reconciliation for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorReplayRequest {
    /// Row identifier.
    pub id: ReplayRequestId,
    /// Connector to reconcile.
    pub connector_name: String,
    /// Trigger.
    pub trigger: ReplayTrigger,
    /// Free-text reason.
    pub reason: Option<String>,
    /// Status.
    pub status: ReplayStatus,
    /// Requester (operator or component name).
    pub requested_by: Option<String>,
    /// Enqueue time.
    pub requested_at: DateTime<Utc>,
    /// Claim time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message.
    pub error: Option<String>,
}

impl ConnectorReplayRequest {
    /// A PENDING request.
    #[must_use]
    pub fn pending(
        connector_name: impl Into<String>,
        trigger: ReplayTrigger,
        reason: Option<String>,
        requested_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReplayRequestId::generate(),
            connector_name: connector_name.into(),
            trigger,
            reason,
            status: ReplayStatus::Pending,
            requested_by,
            requested_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Result of enqueueing a replay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEnqueueOutcome {
    /// A new request was written.
    Enqueued(ConnectorReplayRequest),
    /// An open request for the same connector and trigger already exists
    /// inside the dedupe window.
    Deduplicated(ConnectorReplayRequest),
}

impl ReplayEnqueueOutcome {
    /// The new or existing request.
    #[must_use]
    pub const fn request(&self) -> &ConnectorReplayRequest {
        match self {
            Self::Enqueued(request) | Self::Deduplicated(request) => request,
        }
    }
}
