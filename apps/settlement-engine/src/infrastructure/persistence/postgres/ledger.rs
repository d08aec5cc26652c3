//! Ledger transactions and entries.

use async_trait::async_trait;
use sqlx::Row;

use super::{PgUnitOfWork, code, storage};
use crate::domain::ledger::{LedgerEntry, LedgerRepository, LedgerTransaction};
use crate::domain::shared::{AccountId, LedgerEntryId, LedgerTransactionId, RepositoryError};

#[async_trait]
impl LedgerRepository for PgUnitOfWork {
    async fn insert_ledger_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO ledger_transactions (id, correlation_id, transaction_type, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(transaction.id.as_str())
        .bind(&transaction.correlation_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;

        for (position, entry) in transaction.entries.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::corrupt("ledger_entries", "too many entries"))?;
            sqlx::query(
                r"
                INSERT INTO ledger_entries (
                    id, transaction_id, account_id, asset, direction, amount,
                    reference_type, reference_id, position
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(entry.id.as_str())
            .bind(entry.transaction_id.as_str())
            .bind(entry.account_id.as_str())
            .bind(&entry.asset)
            .bind(entry.direction.as_str())
            .bind(entry.amount)
            .bind(entry.reference_type.as_str())
            .bind(&entry.reference_id)
            .bind(position)
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;
        }
        Ok(())
    }

    async fn list_ledger_transactions(
        &mut self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerTransaction>, RepositoryError> {
        let headers = sqlx::query(
            r"
            SELECT id, correlation_id, transaction_type, created_at
            FROM ledger_transactions
            WHERE correlation_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(correlation_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        let mut transactions = Vec::with_capacity(headers.len());
        for header in &headers {
            let id: String = header.try_get("id").map_err(storage)?;
            let transaction_type: String = header.try_get("transaction_type").map_err(storage)?;

            let rows = sqlx::query(
                r"
                SELECT id, transaction_id, account_id, asset, direction, amount,
                       reference_type, reference_id
                FROM ledger_entries
                WHERE transaction_id = $1
                ORDER BY position
                ",
            )
            .bind(&id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage)?;

            let entries = rows
                .iter()
                .map(|row| {
                    let direction: String = row.try_get("direction").map_err(storage)?;
                    let reference_type: String = row.try_get("reference_type").map_err(storage)?;
                    Ok(LedgerEntry {
                        id: LedgerEntryId::new(row.try_get::<String, _>("id").map_err(storage)?),
                        transaction_id: LedgerTransactionId::new(
                            row.try_get::<String, _>("transaction_id").map_err(storage)?,
                        ),
                        account_id: AccountId::new(
                            row.try_get::<String, _>("account_id").map_err(storage)?,
                        ),
                        asset: row.try_get("asset").map_err(storage)?,
                        direction: code(&direction)?,
                        amount: row.try_get("amount").map_err(storage)?,
                        reference_type: code(&reference_type)?,
                        reference_id: row.try_get("reference_id").map_err(storage)?,
                    })
                })
                .collect::<Result<Vec<_>, RepositoryError>>()?;

            transactions.push(LedgerTransaction {
                id: LedgerTransactionId::new(id),
                correlation_id: header.try_get("correlation_id").map_err(storage)?,
                transaction_type: code(&transaction_type)?,
                created_at: header.try_get("created_at").map_err(storage)?,
                entries,
            });
        }
        Ok(transactions)
    }
}
