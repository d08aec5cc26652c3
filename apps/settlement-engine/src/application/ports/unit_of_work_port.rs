//! Unit of Work Port (Driven Port)
//!
//! One atomic unit spanning every aggregate repository. Dropping a unit
//! without committing rolls it back.

use async_trait::async_trait;

use crate::domain::execution::ExecutionRepository;
use crate::domain::ledger::LedgerRepository;
use crate::domain::order_lifecycle::OrderRepository;
use crate::domain::outbox::OutboxRepository;
use crate::domain::shared::RepositoryError;
use crate::domain::wallet::WalletRepository;

/// An open transaction.
#[async_trait]
pub trait UnitOfWork:
    OrderRepository + ExecutionRepository + WalletRepository + LedgerRepository + OutboxRepository + Send
{
    /// Make every write visible.
    async fn commit(self) -> Result<(), RepositoryError>;

    /// Discard every write.
    async fn rollback(self) -> Result<(), RepositoryError>;
}

/// Opens units of work.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Transaction type.
    type Tx: UnitOfWork;

    /// Begin a unit of work.
    async fn begin(&self) -> Result<Self::Tx, RepositoryError>;
}
