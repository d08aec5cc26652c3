//! PostgreSQL persistence.
//!
//! One [`PgUnitOfWork`] wraps one database transaction. SQL lives with the
//! aggregate it serves: one file per repository trait.

mod connector;
mod executions;
mod ledger;
mod orders;
mod outbox;
mod wallets;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::application::ports::{TransactionManager, UnitOfWork};
use crate::domain::shared::RepositoryError;

/// Startup failures of the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Pool could not connect.
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    /// Schema migration failed.
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Pool-backed store implementing every repository trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(PersistenceError::Connect)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One open database transaction.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionManager for PgStore {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(PgUnitOfWork { tx })
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await.map_err(storage)
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await.map_err(storage)
    }
}

pub(super) fn storage(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(err.to_string())
}

/// Parse a stored code column.
pub(super) fn code<T>(value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = crate::domain::shared::ParseCodeError>,
{
    Ok(value.parse::<T>()?)
}

pub(super) fn to_i64(table: &'static str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::corrupt(table, format!("{value} overflows BIGINT")))
}

pub(super) fn to_u64(table: &'static str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::corrupt(table, format!("negative counter {value}")))
}

pub(super) fn to_u32(table: &'static str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::corrupt(table, format!("negative counter {value}")))
}

pub(super) fn to_i32(table: &'static str, value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::corrupt(table, format!("{value} overflows INTEGER")))
}
