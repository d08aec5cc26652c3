//! HTTP response DTOs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::connector::{ConnectorReplayRequest, ConnectorStatus, ReplayEnqueueOutcome};
use crate::error::SettlementError;

/// Service liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: String,
    /// Application version.
    pub version: String,
    /// Connector status at a glance.
    pub connectors: Vec<ConnectorSummary>,
}

/// One connector in the liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSummary {
    /// Connector name.
    pub name: String,
    /// Derived status.
    pub status: ConnectorStatus,
}

/// A replay request as returned to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRequestResponse {
    /// Request id.
    pub request_id: String,
    /// Connector name.
    pub connector: String,
    /// Trigger code.
    pub trigger: String,
    /// Status code.
    pub status: String,
    /// True when an open request was reused.
    pub deduplicated: bool,
    /// Free-text reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Enqueue time.
    pub requested_at: DateTime<Utc>,
    /// Claim time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayRequestResponse {
    /// Build from a stored request.
    #[must_use]
    pub fn from_request(request: ConnectorReplayRequest, deduplicated: bool) -> Self {
        Self {
            request_id: request.id.to_string(),
            connector: request.connector_name,
            trigger: request.trigger.to_string(),
            status: request.status.to_string(),
            deduplicated,
            reason: request.reason,
            requested_at: request.requested_at,
            started_at: request.started_at,
            completed_at: request.completed_at,
            error: request.error,
        }
    }
}

impl From<ReplayEnqueueOutcome> for ReplayRequestResponse {
    fn from(outcome: ReplayEnqueueOutcome) -> Self {
        match outcome {
            ReplayEnqueueOutcome::Enqueued(request) => Self::from_request(request, false),
            ReplayEnqueueOutcome::Deduplicated(request) => Self::from_request(request, true),
        }
    }
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable reason code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Error response carrying an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// 404 with `code`.
    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let code = err.code();
        Self {
            status: StatusCode::from_u16(code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ErrorBody {
                code: code.reason().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.body.code, message = %self.body.message, "Request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
