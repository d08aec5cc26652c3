//! Orders and order events.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgUnitOfWork, code, storage};
use crate::domain::order_lifecycle::{
    Order, OrderEventRecord, OrderRepository, OrderStatus, ReconstitutedOrderParams,
};
use crate::domain::shared::{AccountId, OrderEventId, OrderId, RepositoryError};

const ORDER_COLUMNS: &str = "id, account_id, instrument, side, order_type, quantity, limit_price, \
     status, filled_quantity, client_order_id, exchange_name, exchange_order_id, \
     exchange_client_order_id, created_at, updated_at";

fn order_from_row(row: &PgRow) -> Result<Order, RepositoryError> {
    let side: String = row.try_get("side").map_err(storage)?;
    let order_type: String = row.try_get("order_type").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(Order::reconstitute(ReconstitutedOrderParams {
        id: OrderId::new(row.try_get::<String, _>("id").map_err(storage)?),
        account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(storage)?),
        instrument: row.try_get("instrument").map_err(storage)?,
        side: code(&side)?,
        order_type: code(&order_type)?,
        quantity: row.try_get("quantity").map_err(storage)?,
        limit_price: row.try_get("limit_price").map_err(storage)?,
        status: code(&status)?,
        filled_quantity: row.try_get("filled_quantity").map_err(storage)?,
        client_order_id: row.try_get("client_order_id").map_err(storage)?,
        exchange_name: row.try_get("exchange_name").map_err(storage)?,
        exchange_order_id: row.try_get("exchange_order_id").map_err(storage)?,
        exchange_client_order_id: row.try_get("exchange_client_order_id").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    }))
}

fn event_from_row(row: &PgRow) -> Result<OrderEventRecord, RepositoryError> {
    let event_type: String = row.try_get("event_type").map_err(storage)?;
    let from_status: Option<String> = row.try_get("from_status").map_err(storage)?;
    let to_status: String = row.try_get("to_status").map_err(storage)?;
    Ok(OrderEventRecord {
        id: OrderEventId::new(row.try_get::<String, _>("id").map_err(storage)?),
        order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(storage)?),
        event_type: code(&event_type)?,
        from_status: from_status.as_deref().map(code).transpose()?,
        to_status: code(&to_status)?,
        payload: row.try_get("payload").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

impl PgUnitOfWork {
    async fn lock_one(
        &mut self,
        filter: &str,
        first: &str,
        second: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {filter} FOR UPDATE");
        let mut query = sqlx::query(&sql).bind(first);
        if let Some(second) = second {
            query = query.bind(second);
        }
        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?;
        row.as_ref().map(order_from_row).transpose()
    }
}

#[async_trait]
impl OrderRepository for PgUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO orders (
                id, account_id, instrument, side, order_type, quantity, limit_price,
                status, filled_quantity, client_order_id, exchange_name, exchange_order_id,
                exchange_client_order_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(order.id().as_str())
        .bind(order.account_id().as_str())
        .bind(order.instrument())
        .bind(order.side().as_str())
        .bind(order.order_type().as_str())
        .bind(order.quantity())
        .bind(order.limit_price())
        .bind(order.status().as_str())
        .bind(order.filled_quantity())
        .bind(order.client_order_id())
        .bind(order.exchange_name())
        .bind(order.exchange_order_id())
        .bind(order.exchange_client_order_id())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2,
                filled_quantity = $3,
                exchange_order_id = $4,
                exchange_client_order_id = $5,
                updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(order.id().as_str())
        .bind(order.status().as_str())
        .bind(order.filled_quantity())
        .bind(order.exchange_order_id())
        .bind(order.exchange_client_order_id())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        Ok(())
    }

    async fn find_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        self.lock_one("id = $1", id.as_str(), None).await
    }

    async fn lock_order_by_exchange_order_id(
        &mut self,
        exchange_name: &str,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.lock_one(
            "exchange_name = $1 AND exchange_order_id = $2",
            exchange_name,
            Some(exchange_order_id),
        )
        .await
    }

    async fn lock_order_by_client_order_id(
        &mut self,
        exchange_name: &str,
        client_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.lock_one(
            "exchange_name = $1 AND (exchange_client_order_id = $2 \
             OR client_order_id = $2 OR (client_order_id IS NULL AND id = $2)) \
             ORDER BY created_at LIMIT 1",
            exchange_name,
            Some(client_order_id),
        )
        .await
    }

    async fn find_orders_by_status(
        &mut self,
        exchange_name: &str,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE exchange_name = $1 AND status = $2 ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(exchange_name)
            .bind(status.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn append_order_event(&mut self, event: &OrderEventRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO order_events (
                id, order_id, event_type, from_status, to_status, payload, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(event.id.as_str())
        .bind(event.order_id.as_str())
        .bind(event.event_type.as_str())
        .bind(event.from_status.map(|s| s.as_str()))
        .bind(event.to_status.as_str())
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_order_events(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEventRecord>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, order_id, event_type, from_status, to_status, payload, created_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;
        rows.iter().map(event_from_row).collect()
    }
}
