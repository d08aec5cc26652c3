//! Executions.

use async_trait::async_trait;
use sqlx::Row;

use super::{PgUnitOfWork, code, storage};
use crate::domain::execution::{Execution, ExecutionRepository, InsertOutcome};
use crate::domain::shared::{AccountId, ExecutionId, OrderId, RepositoryError};

#[async_trait]
impl ExecutionRepository for PgUnitOfWork {
    async fn insert_execution(
        &mut self,
        execution: &Execution,
    ) -> Result<InsertOutcome, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO executions (
                id, order_id, account_id, instrument, trade_id, exchange_name,
                exchange_order_id, side, quantity, price, fee_asset, fee_amount, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (exchange_name, instrument, trade_id) DO NOTHING
            ",
        )
        .bind(execution.id.as_str())
        .bind(execution.order_id.as_str())
        .bind(execution.account_id.as_str())
        .bind(&execution.instrument)
        .bind(&execution.trade_id)
        .bind(&execution.exchange_name)
        .bind(&execution.exchange_order_id)
        .bind(execution.side.as_str())
        .bind(execution.quantity)
        .bind(execution.price)
        .bind(&execution.fee_asset)
        .bind(execution.fee_amount)
        .bind(execution.executed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn list_executions_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, order_id, account_id, instrument, trade_id, exchange_name,
                   exchange_order_id, side, quantity, price, fee_asset, fee_amount, executed_at
            FROM executions
            WHERE order_id = $1
            ORDER BY executed_at, id
            ",
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let side: String = row.try_get("side").map_err(storage)?;
                Ok(Execution {
                    id: ExecutionId::new(row.try_get::<String, _>("id").map_err(storage)?),
                    order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(storage)?),
                    account_id: AccountId::new(
                        row.try_get::<String, _>("account_id").map_err(storage)?,
                    ),
                    instrument: row.try_get("instrument").map_err(storage)?,
                    trade_id: row.try_get("trade_id").map_err(storage)?,
                    exchange_name: row.try_get("exchange_name").map_err(storage)?,
                    exchange_order_id: row.try_get("exchange_order_id").map_err(storage)?,
                    side: code(&side)?,
                    quantity: row.try_get("quantity").map_err(storage)?,
                    price: row.try_get("price").map_err(storage)?,
                    fee_asset: row.try_get("fee_asset").map_err(storage)?,
                    fee_amount: row.try_get("fee_amount").map_err(storage)?,
                    executed_at: row.try_get("executed_at").map_err(storage)?,
                })
            })
            .collect()
    }
}
