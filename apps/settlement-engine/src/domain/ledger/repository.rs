//! Ledger Repository Trait

use async_trait::async_trait;

use super::entry::LedgerTransaction;
use crate::domain::shared::RepositoryError;

/// Append-only persistence for ledger transactions inside a unit of work.
#[async_trait]
pub trait LedgerRepository: Send {
    /// Insert a transaction together with its entries.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    async fn insert_ledger_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), RepositoryError>;

    /// Transactions posted for a correlation id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list_ledger_transactions(
        &mut self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerTransaction>, RepositoryError>;
}
