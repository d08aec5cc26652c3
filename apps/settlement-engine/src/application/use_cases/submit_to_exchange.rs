//! Submit To Exchange Use Case
//!
//! Places a NEW order on the exchange and records the answer. A refusal
//! for a client id the exchange already holds (a re-delivered submission)
//! is resolved by querying the order instead of rejecting it.

use std::sync::Arc;

use crate::application::ports::{
    ExchangeError, ExchangeOrder, ExchangePort, OrderLookup, PlaceOrderRequest,
    TransactionManager,
};
use crate::application::services::{OrderLifecycleService, RateLimitRetryExecutor};
use crate::domain::order_lifecycle::{Order, OrderStatus};
use crate::domain::shared::OrderId;
use crate::error::SettlementResult;

/// Result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Exchange accepted the order.
    Acknowledged {
        /// Exchange order id.
        exchange_order_id: String,
    },
    /// Exchange refused the order; it is now REJECTED locally.
    Rejected {
        /// Exchange message.
        reason: String,
    },
    /// Order was no longer NEW.
    Skipped(OrderStatus),
}

/// Use case for sending an order to the exchange.
pub struct SubmitToExchangeUseCase<T>
where
    T: TransactionManager,
{
    exchange: Arc<dyn ExchangePort>,
    retry: RateLimitRetryExecutor,
    lifecycle: Arc<OrderLifecycleService<T>>,
}

impl<T> SubmitToExchangeUseCase<T>
where
    T: TransactionManager,
{
    /// Create a new SubmitToExchangeUseCase.
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
    pub async fn execute(&self, order_id: &OrderId) -> SettlementResult<SubmissionOutcome> {
        let order = self.lifecycle.get(order_id).await?;
        if order.status() != OrderStatus::New {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status(),
                "Order already submitted"
            );
            return Ok(SubmissionOutcome::Skipped(order.status()));
        }

        let request = PlaceOrderRequest::from_order(&order);
        let placed = self
            .retry
            .execute("place_order", || self.exchange.place_order(&request))
            .await;

        match placed {
            Ok(remote) => self.acknowledge(&order, &remote).await,
            Err(ExchangeError::Rejected { code, message }) => {
                if let Some(remote) = self.find_existing(&order).await? {
                    tracing::info!(
                        order_id = %order_id,
                        exchange_order_id = %remote.exchange_order_id,
                        "Exchange already holds order, acknowledging"
                    );
                    return self.acknowledge(&order, &remote).await;
                }
                let reason =
                    code.map_or_else(|| message.clone(), |code| format!("{code}: {message}"));
                self.lifecycle.reject(order_id, &reason).await?;
                Ok(SubmissionOutcome::Rejected { reason })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn acknowledge(
        &self,
        order: &Order,
        remote: &ExchangeOrder,
    ) -> SettlementResult<SubmissionOutcome> {
        self.lifecycle
            .acknowledge(
                order.id(),
                order.exchange_name(),
                &remote.exchange_order_id,
                remote.client_order_id.as_deref(),
            )
            .await?;
        Ok(SubmissionOutcome::Acknowledged {
            exchange_order_id: remote.exchange_order_id.clone(),
        })
    }

    /// The exchange's copy of an order it already holds under our client
    /// order id.
    async fn find_existing(&self, order: &Order) -> SettlementResult<Option<ExchangeOrder>> {
        let lookup = OrderLookup {
            instrument: order.instrument().to_string(),
            exchange_order_id: None,
            client_order_id: Some(order.outbound_client_order_id().to_string()),
        };
        match self
            .retry
            .execute("query_order", || self.exchange.query_order(&lookup))
            .await
        {
            Ok(remote) => Ok(Some(remote)),
            Err(ExchangeError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
