//! Outbox rows: enqueue inside a unit of work, relay against the pool.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgStore, PgUnitOfWork, code, storage, to_i32, to_u32};
use crate::domain::outbox::{OutboxEvent, OutboxRelayStore, OutboxRepository, before};
use crate::domain::shared::{OutboxEventId, RepositoryError};

const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, schema_version, \
     payload, topic, partition_key, status, attempt_count, created_at, next_attempt_at, \
     processing_started_at, published_at, last_error";

fn event_from_row(row: &PgRow) -> Result<OutboxEvent, RepositoryError> {
    let aggregate_type: String = row.try_get("aggregate_type").map_err(storage)?;
    let event_type: String = row.try_get("event_type").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(OutboxEvent {
        id: OutboxEventId::new(row.try_get::<String, _>("id").map_err(storage)?),
        aggregate_type: code(&aggregate_type)?,
        aggregate_id: row.try_get("aggregate_id").map_err(storage)?,
        event_type: code(&event_type)?,
        schema_version: to_u32(
            "outbox_events",
            row.try_get("schema_version").map_err(storage)?,
        )?,
        payload: row.try_get("payload").map_err(storage)?,
        topic: row.try_get("topic").map_err(storage)?,
        partition_key: row.try_get("partition_key").map_err(storage)?,
        status: code(&status)?,
        attempt_count: to_u32("outbox_events", row.try_get("attempt_count").map_err(storage)?)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(storage)?,
        processing_started_at: row.try_get("processing_started_at").map_err(storage)?,
        published_at: row.try_get("published_at").map_err(storage)?,
        last_error: row.try_get("last_error").map_err(storage)?,
    })
}

#[async_trait]
impl OutboxRepository for PgUnitOfWork {
    async fn enqueue_outbox(&mut self, event: &OutboxEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO outbox_events (
                id, aggregate_type, aggregate_id, event_type, schema_version, payload,
                topic, partition_key, status, attempt_count, created_at, next_attempt_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(event.id.as_str())
        .bind(event.aggregate_type.as_str())
        .bind(&event.aggregate_id)
        .bind(event.event_type.as_str())
        .bind(to_i32("outbox_events", event.schema_version)?)
        .bind(&event.payload)
        .bind(&event.topic)
        .bind(&event.partition_key)
        .bind(event.status.as_str())
        .bind(to_i32("outbox_events", event.attempt_count)?)
        .bind(event.created_at)
        .bind(event.next_attempt_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_outbox_for_aggregate(
        &mut self,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let sql =
            format!("SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE aggregate_id = $1 ORDER BY seq");
        let rows = sqlx::query(&sql)
            .bind(aggregate_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage)?;
        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl OutboxRelayStore for PgStore {
    async fn reclaim_stale(
        &self,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'FAILED', processing_started_at = NULL, next_attempt_at = $1
            WHERE status = 'PROCESSING' AND processing_started_at < $2
            ",
        )
        .bind(now)
        .bind(before(now, lease))
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn claim_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            WITH due AS (
                SELECT id
                FROM outbox_events
                WHERE status IN ('NEW', 'FAILED') AND next_attempt_at <= $1
                ORDER BY seq
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_events AS o
            SET status = 'PROCESSING', processing_started_at = $1
            FROM due
            WHERE o.id = due.id
            RETURNING o.*
            ",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(storage)?;

        let mut claimed: Vec<(i64, OutboxEvent)> = rows
            .iter()
            .map(|row| Ok((row.try_get("seq").map_err(storage)?, event_from_row(row)?)))
            .collect::<Result<_, RepositoryError>>()?;
        claimed.sort_by_key(|(seq, _)| *seq);
        Ok(claimed.into_iter().map(|(_, event)| event).collect())
    }

    async fn mark_published(
        &self,
        id: &OutboxEventId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'PUBLISHED', published_at = $2,
                processing_started_at = NULL, last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'FAILED', attempt_count = $2, next_attempt_at = $3,
                processing_started_at = NULL, last_error = $4
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(to_i32("outbox_events", attempt_count)?)
        .bind(next_attempt_at)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn mark_dead(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'DEAD', attempt_count = $2,
                processing_started_at = NULL, last_error = $3
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(to_i32("outbox_events", attempt_count)?)
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn requeue_dead(
        &self,
        ids: Option<&[OutboxEventId]>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let ids: Option<Vec<String>> =
            ids.map(|ids| ids.iter().map(|id| id.as_str().to_string()).collect());
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'NEW', attempt_count = 0, next_attempt_at = $1,
                processing_started_at = NULL
            WHERE status = 'DEAD' AND ($2::TEXT[] IS NULL OR id = ANY($2))
            ",
        )
        .bind(now)
        .bind(ids)
        .execute(self.pool())
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn find_outbox_event(
        &self,
        id: &OutboxEventId,
    ) -> Result<Option<OutboxEvent>, RepositoryError> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(storage)?;
        row.as_ref().map(event_from_row).transpose()
    }
}
