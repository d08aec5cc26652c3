//! HTTP Controller (Driver Adapter)
//!
//! Axum router over the connector health handles and the replay use case.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use super::request::ReplayRequestBody;
use super::response::{ApiError, ConnectorSummary, HealthResponse, ReplayRequestResponse};
use crate::application::services::ConnectorHealthHandle;
use crate::application::use_cases::RequestReplayUseCase;
use crate::domain::connector::ConnectorHealthState;
use crate::domain::shared::ReplayRequestId;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Manual replay use case.
    pub replay: Arc<RequestReplayUseCase>,
    /// Health handle per connector name.
    pub health: Arc<BTreeMap<String, ConnectorHealthHandle>>,
    /// Application version.
    pub version: String,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/connectors/{name}/health", get(connector_health))
        .route("/api/v1/connectors/replay", post(request_replay))
        .route("/api/v1/connectors/replay/{id}", get(replay_status))
        .with_state(state)
}

/// Liveness with a per-connector status summary.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let connectors = state
        .health
        .iter()
        .map(|(name, handle)| ConnectorSummary {
            name: name.clone(),
            status: handle
                .snapshot()
                .derive_status(handle.down_threshold(), now),
        })
        .collect();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        connectors,
    })
}

async fn connector_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ConnectorHealthState>, ApiError> {
    let handle = state.health.get(&name).ok_or_else(|| {
        ApiError::not_found("UNKNOWN_CONNECTOR", format!("unknown connector: {name}"))
    })?;
    // Persisted status lags; report the one derived now.
    let mut snapshot = handle.snapshot();
    snapshot.status = snapshot.derive_status(handle.down_threshold(), Utc::now());
    Ok(Json(snapshot))
}

/// Queue a MANUAL replay. 202 for a new request, 200 when deduplicated.
async fn request_replay(
    State(state): State<AppState>,
    Json(body): Json<ReplayRequestBody>,
) -> Result<(StatusCode, Json<ReplayRequestResponse>), ApiError> {
    let outcome = state
        .replay
        .execute(body.connector.as_deref(), body.reason, body.requested_by)
        .await?;
    let response = ReplayRequestResponse::from(outcome);
    let status = if response.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(response)))
}

async fn replay_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplayRequestResponse>, ApiError> {
    let request = state.replay.status(&ReplayRequestId::new(id)).await?;
    Ok(Json(ReplayRequestResponse::from_request(request, false)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connector::{ConnectorStateRepository, ConnectorStatus};
    use crate::infrastructure::persistence::InMemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let store: Arc<dyn ConnectorStateRepository> = Arc::new(InMemoryStore::new());
        let replay = Arc::new(RequestReplayUseCase::new(
            Arc::clone(&store),
            ["binance".to_string()],
            "binance",
            Duration::from_secs(60),
        ));
        let handle = ConnectorHealthHandle::new("binance", store, Duration::from_secs(120));
        AppState {
            replay,
            health: Arc::new(BTreeMap::from([("binance".to_string(), handle)])),
            version: "0.1.0-test".to_string(),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_replay(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/connectors/replay")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_lists_connectors() {
        let app = create_router(create_test_state());
        let (status, body) = send(
            app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connectors"][0]["name"], "binance");
        assert_eq!(body["connectors"][0]["status"], "DOWN");
    }

    #[tokio::test]
    async fn connector_health_reports_derived_status() {
        let app = create_router(create_test_state());
        let (status, body) = send(
            app,
            Request::builder()
                .uri("/api/v1/connectors/binance/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], ConnectorStatus::Down.as_str());
        assert_eq!(body["connector_name"], "binance");
    }

    #[tokio::test]
    async fn unknown_connector_health_is_not_found() {
        let app = create_router(create_test_state());
        let (status, body) = send(
            app,
            Request::builder()
                .uri("/api/v1/connectors/kraken/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_CONNECTOR");
    }

    #[tokio::test]
    async fn replay_is_queued_then_deduplicated() {
        let state = create_test_state();
        let (status, first) = send(
            create_router(state.clone()),
            post_replay(&serde_json::json!({ "reason": "gap after outage" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(first["status"], "PENDING");
        assert_eq!(first["connector"], "binance");

        let (status, second) =
            send(create_router(state.clone()), post_replay(&serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["deduplicated"], true);
        assert_eq!(second["request_id"], first["request_id"]);

        let uri = format!(
            "/api/v1/connectors/replay/{}",
            first["request_id"].as_str().unwrap()
        );
        let (status, fetched) = send(
            create_router(state),
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["trigger"], "MANUAL");
    }

    #[tokio::test]
    async fn replay_for_unknown_connector_is_bad_request() {
        let app = create_router(create_test_state());
        let (status, body) =
            send(app, post_replay(&serde_json::json!({ "connector": "kraken" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_CONNECTOR");
    }

    #[tokio::test]
    async fn missing_replay_request_is_not_found() {
        let app = create_router(create_test_state());
        let (status, body) = send(
            app,
            Request::builder()
                .uri("/api/v1/connectors/replay/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}
