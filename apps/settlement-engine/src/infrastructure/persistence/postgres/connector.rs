//! Connector health and the replay queue.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgStore, code, storage, to_i32, to_i64, to_u32, to_u64};
use crate::domain::connector::{
    ConnectorHealthState, ConnectorReplayRequest, ConnectorStateRepository, ReplayEnqueueOutcome,
    ReplayStatus,
};
use crate::domain::outbox::before;
use crate::domain::shared::{ReplayRequestId, RepositoryError};

const HEALTH: &str = "connector_health_state";
const REPLAY_COLUMNS: &str = "id, connector_name, trigger_type, reason, status, requested_by, \
     requested_at, started_at, completed_at, error";

fn health_from_row(row: &PgRow) -> Result<ConnectorHealthState, RepositoryError> {
    let status: String = row.try_get("status").map_err(storage)?;
    let websocket_state: String = row.try_get("websocket_state").map_err(storage)?;
    let counter = |column: &str| -> Result<u64, RepositoryError> {
        to_u64(HEALTH, row.try_get(column).map_err(storage)?)
    };
    Ok(ConnectorHealthState {
        connector_name: row.try_get("connector_name").map_err(storage)?,
        status: code(&status)?,
        last_success_at: row.try_get("last_success_at").map_err(storage)?,
        last_poll_at: row.try_get("last_poll_at").map_err(storage)?,
        last_error_at: row.try_get("last_error_at").map_err(storage)?,
        last_error_code: row.try_get("last_error_code").map_err(storage)?,
        last_error_message: row.try_get("last_error_message").map_err(storage)?,
        open_orders_fetched: counter("open_orders_fetched")?,
        trades_fetched: counter("trades_fetched")?,
        websocket_state: code(&websocket_state)?,
        reconnect_attempts: to_u32(HEALTH, row.try_get("reconnect_attempts").map_err(storage)?)?,
        stream_fills_inserted: counter("stream_fills_inserted")?,
        stream_fills_duplicate: counter("stream_fills_duplicate")?,
        stream_fills_unmapped: counter("stream_fills_unmapped")?,
        stream_errors: counter("stream_errors")?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn replay_from_row(row: &PgRow) -> Result<ConnectorReplayRequest, RepositoryError> {
    let trigger: String = row.try_get("trigger_type").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(ConnectorReplayRequest {
        id: ReplayRequestId::new(row.try_get::<String, _>("id").map_err(storage)?),
        connector_name: row.try_get("connector_name").map_err(storage)?,
        trigger: code(&trigger)?,
        reason: row.try_get("reason").map_err(storage)?,
        status: code(&status)?,
        requested_by: row.try_get("requested_by").map_err(storage)?,
        requested_at: row.try_get("requested_at").map_err(storage)?,
        started_at: row.try_get("started_at").map_err(storage)?,
        completed_at: row.try_get("completed_at").map_err(storage)?,
        error: row.try_get("error").map_err(storage)?,
    })
}

#[async_trait]
impl ConnectorStateRepository for PgStore {
    async fn upsert_health(&self, state: &ConnectorHealthState) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO connector_health_state (
                connector_name, status, last_success_at, last_poll_at, last_error_at,
                last_error_code, last_error_message, open_orders_fetched, trades_fetched,
                websocket_state, reconnect_attempts, stream_fills_inserted,
                stream_fills_duplicate, stream_fills_unmapped, stream_errors, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (connector_name) DO UPDATE SET
                status = EXCLUDED.status,
                last_success_at = EXCLUDED.last_success_at,
                last_poll_at = EXCLUDED.last_poll_at,
                last_error_at = EXCLUDED.last_error_at,
                last_error_code = EXCLUDED.last_error_code,
                last_error_message = EXCLUDED.last_error_message,
                open_orders_fetched = EXCLUDED.open_orders_fetched,
                trades_fetched = EXCLUDED.trades_fetched,
                websocket_state = EXCLUDED.websocket_state,
                reconnect_attempts = EXCLUDED.reconnect_attempts,
                stream_fills_inserted = EXCLUDED.stream_fills_inserted,
                stream_fills_duplicate = EXCLUDED.stream_fills_duplicate,
                stream_fills_unmapped = EXCLUDED.stream_fills_unmapped,
                stream_errors = EXCLUDED.stream_errors,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&state.connector_name)
        .bind(state.status.as_str())
        .bind(state.last_success_at)
        .bind(state.last_poll_at)
        .bind(state.last_error_at)
        .bind(&state.last_error_code)
        .bind(&state.last_error_message)
        .bind(to_i64(HEALTH, state.open_orders_fetched)?)
        .bind(to_i64(HEALTH, state.trades_fetched)?)
        .bind(state.websocket_state.as_str())
        .bind(to_i32(HEALTH, state.reconnect_attempts)?)
        .bind(to_i64(HEALTH, state.stream_fills_inserted)?)
        .bind(to_i64(HEALTH, state.stream_fills_duplicate)?)
        .bind(to_i64(HEALTH, state.stream_fills_unmapped)?)
        .bind(to_i64(HEALTH, state.stream_errors)?)
        .bind(state.updated_at)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn find_health(
        &self,
        connector_name: &str,
    ) -> Result<Option<ConnectorHealthState>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM connector_health_state WHERE connector_name = $1")
            .bind(connector_name)
            .fetch_optional(self.pool())
            .await
            .map_err(storage)?;
        row.as_ref().map(health_from_row).transpose()
    }

    async fn enqueue_replay(
        &self,
        request: ConnectorReplayRequest,
        dedupe_window: Duration,
    ) -> Result<ReplayEnqueueOutcome, RepositoryError> {
        let mut tx = self.pool().begin().await.map_err(storage)?;

        // Serializes concurrent enqueues for the same connector and trigger.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
            .bind(&request.connector_name)
            .bind(request.trigger.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        let sql = format!(
            "SELECT {REPLAY_COLUMNS} FROM connector_replay_requests \
             WHERE connector_name = $1 AND trigger_type = $2 \
               AND status IN ('PENDING', 'RUNNING') AND requested_at >= $3 \
             ORDER BY requested_at LIMIT 1"
        );
        let existing = sqlx::query(&sql)
            .bind(&request.connector_name)
            .bind(request.trigger.as_str())
            .bind(before(request.requested_at, dedupe_window))
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        if let Some(row) = existing {
            let existing = replay_from_row(&row)?;
            tx.commit().await.map_err(storage)?;
            return Ok(ReplayEnqueueOutcome::Deduplicated(existing));
        }

        sqlx::query(
            r"
            INSERT INTO connector_replay_requests (
                id, connector_name, trigger_type, reason, status, requested_by, requested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(request.id.as_str())
        .bind(&request.connector_name)
        .bind(request.trigger.as_str())
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(&request.requested_by)
        .bind(request.requested_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(ReplayEnqueueOutcome::Enqueued(request))
    }

    async fn claim_next_replay(
        &self,
        connector_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError> {
        let row = sqlx::query(
            r"
            WITH next AS (
                SELECT id
                FROM connector_replay_requests
                WHERE connector_name = $1 AND status = 'PENDING'
                ORDER BY requested_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE connector_replay_requests AS r
            SET status = 'RUNNING', started_at = $2
            FROM next
            WHERE r.id = next.id
            RETURNING r.*
            ",
        )
        .bind(connector_name)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(storage)?;
        row.as_ref().map(replay_from_row).transpose()
    }

    async fn complete_replay(
        &self,
        id: &ReplayRequestId,
        status: ReplayStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE connector_replay_requests
            SET status = $2, error = $3, completed_at = $4
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "connector_replay_request",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_replay_request(
        &self,
        id: &ReplayRequestId,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError> {
        let sql = format!("SELECT {REPLAY_COLUMNS} FROM connector_replay_requests WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(storage)?;
        row.as_ref().map(replay_from_row).transpose()
    }
}
