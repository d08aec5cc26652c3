//! Execution Repository Trait

use async_trait::async_trait;

use super::entity::{Execution, InsertOutcome};
use crate::domain::shared::{OrderId, RepositoryError};

/// Persistence for immutable execution rows inside a unit of work.
#[async_trait]
pub trait ExecutionRepository: Send {
    /// Insert unless `(exchange_name, instrument, trade_id)` already exists.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails for any reason other than the
    /// dedupe key.
    async fn insert_execution(
        &mut self,
        execution: &Execution,
    ) -> Result<InsertOutcome, RepositoryError>;

    /// Executions applied to one order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list_executions_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<Execution>, RepositoryError>;
}
