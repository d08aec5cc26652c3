//! Order Lifecycle Service
//!
//! Owns order creation and the acknowledge, cancel and reject transitions.
//! Every operation is one unit of work: the order row, its audit event, the
//! wallet movement and the outbox rows commit together or not at all.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde_json::json;

use super::outbox_writer::OutboxWriter;
use super::wallet_settlement::WalletSettlement;
use crate::application::ports::{InstrumentCatalogPort, TransactionManager, UnitOfWork};
use crate::domain::order_lifecycle::{
    AckOutcome, CreateOrderCommand, Order, OrderError, OrderEventRecord, OrderEventType,
    OrderRepository, OrderStatus, Transition,
};
use crate::domain::outbox::OrderSubmittedV1;
use crate::domain::shared::{AccountId, OrderId};
use crate::domain::wallet::ReservationStatus;
use crate::error::{SettlementError, SettlementResult};

/// Service owning order state changes outside the fill path.
pub struct OrderLifecycleService<T>
where
    T: TransactionManager,
{
    transactions: Arc<T>,
    catalog: Arc<dyn InstrumentCatalogPort>,
    outbox: OutboxWriter,
}

impl<T> OrderLifecycleService<T>
where
    T: TransactionManager,
{
    /// Create a new OrderLifecycleService.
    pub fn new(
        transactions: Arc<T>,
        catalog: Arc<dyn InstrumentCatalogPort>,
        outbox: OutboxWriter,
    ) -> Self {
        Self {
            transactions,
            catalog,
            outbox,
        }
    }

    /// Persist a new order, reserve its funds and announce it.
    ///
    /// Risk gating is the caller's responsibility.
    pub async fn create(&self, command: CreateOrderCommand) -> SettlementResult<Order> {
        let now = Utc::now();
        let order = Order::new(command, now)?;
        let pair = self
            .catalog
            .asset_pair(order.instrument())
            .ok_or_else(|| SettlementError::UnknownInstrument(order.instrument().to_string()))?;

        let mut tx = self.transactions.begin().await?;
        tx.insert_order(&order).await?;
        let reserved = WalletSettlement::reserve_for_order(&mut tx, &order, &pair, now).await?;

        tx.append_order_event(&OrderEventRecord::new(
            order.id().clone(),
            OrderEventType::OrderCreated,
            None,
            OrderStatus::New,
            json!({
                "instrument": order.instrument(),
                "side": order.side(),
                "order_type": order.order_type(),
                "quantity": order.quantity(),
                "limit_price": order.limit_price(),
            }),
            now,
        ))
        .await?;

        self.outbox
            .enqueue(&mut tx, &OrderSubmittedV1::from_order(&order), now)
            .await?;
        if let Some(balance) = reserved {
            self.outbox
                .balances_updated(&mut tx, &[balance], "ORDER_RESERVED", Some(order.id()), now)
                .await?;
        }
        tx.commit().await?;

        counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            account_id = %order.account_id(),
            instrument = %order.instrument(),
            side = %order.side(),
            quantity = %order.quantity(),
            "Order created"
        );
        Ok(order)
    }

    /// Record the exchange acknowledgement of an order.
    pub async fn acknowledge(
        &self,
        order_id: &OrderId,
        exchange_name: &str,
        exchange_order_id: &str,
        exchange_client_order_id: Option<&str>,
    ) -> SettlementResult<AckOutcome> {
        let now = Utc::now();
        let mut tx = self.transactions.begin().await?;
        let mut order = lock_existing(&mut tx, order_id).await?;

        let outcome =
            order.acknowledge(exchange_name, exchange_order_id, exchange_client_order_id, now)?;
        let AckOutcome::Acknowledged(transition) = outcome else {
            tracing::debug!(order_id = %order_id, "Duplicate acknowledgement ignored");
            return Ok(outcome);
        };

        tx.update_order(&order).await?;
        self.record_transition(
            &mut tx,
            &order,
            OrderEventType::OrderAcknowledged,
            transition,
            json!({
                "exchange_name": exchange_name,
                "exchange_order_id": exchange_order_id,
                "exchange_client_order_id": exchange_client_order_id,
            }),
            None,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            exchange_order_id,
            "Order acknowledged"
        );
        Ok(outcome)
    }

    /// Cancel an order on behalf of its account and release its funds.
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        account_id: &AccountId,
        reason: Option<&str>,
    ) -> SettlementResult<Order> {
        let now = Utc::now();
        let mut tx = self.transactions.begin().await?;
        let mut order = lock_existing(&mut tx, order_id).await?;

        let transition = order.cancel(account_id, now)?;
        tx.update_order(&order).await?;
        let released =
            WalletSettlement::release_for_order(&mut tx, order_id, ReservationStatus::Released, now)
                .await?;

        self.record_transition(
            &mut tx,
            &order,
            OrderEventType::OrderCanceled,
            transition,
            json!({ "reason": reason }),
            reason,
        )
        .await?;
        if let Some(balance) = released {
            self.outbox
                .balances_updated(&mut tx, &[balance], "ORDER_CANCELED", Some(order_id), now)
                .await?;
        }
        tx.commit().await?;

        counter!("orders_canceled_total").increment(1);
        tracing::info!(order_id = %order_id, from = %transition.from, "Order canceled");
        Ok(order)
    }

    /// Reject a NEW order the exchange refused and release its funds.
    pub async fn reject(&self, order_id: &OrderId, reason: &str) -> SettlementResult<Order> {
        let now = Utc::now();
        let mut tx = self.transactions.begin().await?;
        let mut order = lock_existing(&mut tx, order_id).await?;

        let transition = order.reject(now)?;
        tx.update_order(&order).await?;
        let released = WalletSettlement::release_for_order(
            &mut tx,
            order_id,
            ReservationStatus::Cancelled,
            now,
        )
        .await?;

        self.record_transition(
            &mut tx,
            &order,
            OrderEventType::OrderRejected,
            transition,
            json!({ "reason": reason }),
            Some(reason),
        )
        .await?;
        if let Some(balance) = released {
            self.outbox
                .balances_updated(&mut tx, &[balance], "ORDER_REJECTED", Some(order_id), now)
                .await?;
        }
        tx.commit().await?;

        counter!("orders_rejected_total").increment(1);
        tracing::warn!(order_id = %order_id, reason, "Order rejected by exchange");
        Ok(order)
    }

    /// Load an order.
    pub async fn get(&self, order_id: &OrderId) -> SettlementResult<Order> {
        let mut tx = self.transactions.begin().await?;
        let order = tx.find_order(order_id).await?;
        tx.rollback().await?;
        order.ok_or_else(|| {
            OrderError::NotFound {
                order_id: order_id.to_string(),
            }
            .into()
        })
    }

    /// Orders on `exchange_name` still waiting for acknowledgement.
    pub async fn awaiting_acknowledgement(&self, exchange_name: &str) -> SettlementResult<Vec<Order>> {
        let mut tx = self.transactions.begin().await?;
        let orders = tx.find_orders_by_status(exchange_name, OrderStatus::New).await?;
        tx.rollback().await?;
        Ok(orders)
    }

    async fn record_transition(
        &self,
        tx: &mut T::Tx,
        order: &Order,
        event_type: OrderEventType,
        transition: Transition,
        payload: serde_json::Value,
        reason: Option<&str>,
    ) -> SettlementResult<()> {
        let now = order.updated_at();
        tx.append_order_event(&OrderEventRecord::new(
            order.id().clone(),
            event_type,
            Some(transition.from),
            transition.to,
            payload,
            now,
        ))
        .await?;
        self.outbox
            .order_updated(tx, order, transition.from, reason, now)
            .await
    }
}

/// Lock an order or fail with `NotFound`.
async fn lock_existing<U>(tx: &mut U, order_id: &OrderId) -> SettlementResult<Order>
where
    U: UnitOfWork,
{
    tx.lock_order(order_id).await?.ok_or_else(|| {
        OrderError::NotFound {
            order_id: order_id.to_string(),
        }
        .into()
    })
}
