//! Wallet balances and reservations.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgUnitOfWork, code, storage};
use crate::domain::shared::{AccountId, OrderId, RepositoryError, ReservationId};
use crate::domain::wallet::{WalletBalance, WalletRepository, WalletReservation};

fn balance_from_row(row: &PgRow) -> Result<WalletBalance, RepositoryError> {
    Ok(WalletBalance {
        account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(storage)?),
        asset: row.try_get("asset").map_err(storage)?,
        available: row.try_get("available").map_err(storage)?,
        reserved: row.try_get("reserved").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<WalletReservation, RepositoryError> {
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(WalletReservation {
        id: ReservationId::new(row.try_get::<String, _>("id").map_err(storage)?),
        account_id: AccountId::new(row.try_get::<String, _>("account_id").map_err(storage)?),
        asset: row.try_get("asset").map_err(storage)?,
        amount: row.try_get("amount").map_err(storage)?,
        order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(storage)?),
        status: code(&status)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

#[async_trait]
impl WalletRepository for PgUnitOfWork {
    async fn lock_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<WalletBalance, RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO wallet_balances (account_id, asset, available, reserved, updated_at)
            VALUES ($1, $2, 0, 0, $3)
            ON CONFLICT (account_id, asset) DO NOTHING
            ",
        )
        .bind(account_id.as_str())
        .bind(asset)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        let row = sqlx::query(
            r"
            SELECT account_id, asset, available, reserved, updated_at
            FROM wallet_balances
            WHERE account_id = $1 AND asset = $2
            FOR UPDATE
            ",
        )
        .bind(account_id.as_str())
        .bind(asset)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage)?;
        balance_from_row(&row)
    }

    async fn save_balance(&mut self, balance: &WalletBalance) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE wallet_balances
            SET available = $3, reserved = $4, updated_at = $5
            WHERE account_id = $1 AND asset = $2
            ",
        )
        .bind(balance.account_id.as_str())
        .bind(&balance.asset)
        .bind(balance.available)
        .bind(balance.reserved)
        .bind(balance.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn find_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<Option<WalletBalance>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT account_id, asset, available, reserved, updated_at
            FROM wallet_balances
            WHERE account_id = $1 AND asset = $2
            ",
        )
        .bind(account_id.as_str())
        .bind(asset)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn insert_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO wallet_reservations (
                id, account_id, asset, amount, order_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(reservation.id.as_str())
        .bind(reservation.account_id.as_str())
        .bind(&reservation.asset)
        .bind(reservation.amount)
        .bind(reservation.order_id.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn lock_active_reservation(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<WalletReservation>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, asset, amount, order_id, status, created_at, updated_at
            FROM wallet_reservations
            WHERE order_id = $1 AND status = 'ACTIVE'
            FOR UPDATE
            ",
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn save_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE wallet_reservations
            SET amount = $2, status = $3, updated_at = $4
            WHERE id = $1
            ",
        )
        .bind(reservation.id.as_str())
        .bind(reservation.amount)
        .bind(reservation.status.as_str())
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_reservations_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<WalletReservation>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, asset, amount, order_id, status, created_at, updated_at
            FROM wallet_reservations
            WHERE order_id = $1
            ORDER BY created_at
            ",
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;
        rows.iter().map(reservation_from_row).collect()
    }
}
