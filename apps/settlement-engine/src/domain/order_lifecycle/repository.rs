//! Order Repository Trait
//!
//! Persistence abstraction for orders and their audit trail. Implementations
//! are scoped to one unit of work, so every read that precedes a mutation
//! takes the row lock.

use async_trait::async_trait;

use super::aggregate::Order;
use super::events::OrderEventRecord;
use super::value_objects::OrderStatus;
use crate::domain::shared::{OrderId, RepositoryError};

/// Repository trait for Order persistence inside a unit of work.
#[async_trait]
pub trait OrderRepository: Send {
    /// Insert a freshly created order.
    ///
    /// # Errors
    ///
    /// Returns error if the order id already exists or the write fails.
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    /// Persist the mutable columns of an existing order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist.
    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    /// Load an order by id without locking it.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Load an order by id and hold its row lock until the unit ends.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Load an order by the exchange-assigned order id, locked.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn lock_order_by_exchange_order_id(
        &mut self,
        exchange_name: &str,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Load an order by client order id, locked.
    ///
    /// Matches the id echoed by the exchange, the caller-supplied client
    /// order id, or the internal id used as client order id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn lock_order_by_client_order_id(
        &mut self,
        exchange_name: &str,
        client_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders on `exchange_name` currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_orders_by_status(
        &mut self,
        exchange_name: &str,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Append one audit row.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    async fn append_order_event(&mut self, event: &OrderEventRecord) -> Result<(), RepositoryError>;

    /// Audit trail of one order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list_order_events(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEventRecord>, RepositoryError>;
}
