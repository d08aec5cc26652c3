//! Cancel Order Use Case
//!
//! Cancels on the exchange first when the exchange holds the order, then
//! cancels locally and releases the reservation.

use std::sync::Arc;

use crate::application::ports::{ExchangeError, ExchangePort, OrderLookup, TransactionManager};
use crate::application::services::{OrderLifecycleService, RateLimitRetryExecutor};
use crate::domain::order_lifecycle::{Order, OrderError};
use crate::domain::shared::{AccountId, OrderId};
use crate::error::SettlementResult;

/// Use case for account-initiated cancellation.
pub struct CancelOrderUseCase<T>
where
    T: TransactionManager,
{
    exchange: Arc<dyn ExchangePort>,
    retry: RateLimitRetryExecutor,
    lifecycle: Arc<OrderLifecycleService<T>>,
}

impl<T> CancelOrderUseCase<T>
where
    T: TransactionManager,
{
    /// Create a new CancelOrderUseCase.
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        retry: RateLimitRetryExecutor,
        lifecycle: Arc<OrderLifecycleService<T>>,
    ) -> Self {
        Self {
            exchange,
            retry,
            lifecycle,
        }
    }

    /// Execute the use case.
    pub async fn execute(
        &self,
        order_id: &OrderId,
        account_id: &AccountId,
        reason: Option<&str>,
    ) -> SettlementResult<Order> {
        let order = self.lifecycle.get(order_id).await?;
        if order.account_id() != account_id {
            return Err(OrderError::AccountMismatch {
                order_id: order_id.to_string(),
            }
            .into());
        }
        if order.status().is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                order_id: order_id.to_string(),
                status: order.status(),
            }
            .into());
        }

        if order.exchange_order_id().is_some() {
            let lookup = OrderLookup::for_order(&order);
            match self
                .retry
                .execute("cancel_order", || self.exchange.cancel_order(&lookup))
                .await
            {
                Ok(_) => {
                    tracing::info!(order_id = %order_id, "Order canceled on exchange");
                }
                Err(ExchangeError::NotFound { message }) => {
                    tracing::info!(
                        order_id = %order_id,
                        message = %message,
                        "Order unknown on exchange, canceling locally"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.lifecycle.cancel(order_id, account_id, reason).await
    }
}
