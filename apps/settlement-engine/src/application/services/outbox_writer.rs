//! Enqueueing outbox rows inside a unit of work.

use chrono::{DateTime, Utc};

use crate::domain::order_lifecycle::{Order, OrderStatus};
use crate::domain::outbox::{
    BalanceUpdatedV1, EventPayload, OrderUpdatedV1, OrderUpdatedV2, OutboxEvent, OutboxRepository,
};
use crate::domain::shared::OrderId;
use crate::domain::wallet::WalletBalance;
use crate::error::SettlementResult;

/// Builds validated outbox rows and writes them through the caller's unit.
#[derive(Debug, Clone)]
pub struct OutboxWriter {
    topic_prefix: String,
}

impl OutboxWriter {
    /// Writer publishing under `<topic_prefix>.<event-type>.v<version>`.
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Topic prefix.
    #[must_use]
    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    /// Validate and enqueue one payload.
    pub async fn enqueue<U, P>(
        &self,
        tx: &mut U,
        payload: &P,
        now: DateTime<Utc>,
    ) -> SettlementResult<OutboxEvent>
    where
        U: OutboxRepository + ?Sized,
        P: EventPayload,
    {
        let event = OutboxEvent::from_payload(&self.topic_prefix, payload, now)?;
        tx.enqueue_outbox(&event).await?;
        Ok(event)
    }

    /// Enqueue `order-updated` in both schema versions.
    pub async fn order_updated<U>(
        &self,
        tx: &mut U,
        order: &Order,
        previous_status: OrderStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> SettlementResult<()>
    where
        U: OutboxRepository + ?Sized,
    {
        self.enqueue(tx, &OrderUpdatedV1::from_order(order), now)
            .await?;
        self.enqueue(
            tx,
            &OrderUpdatedV2::from_order(order, previous_status, reason),
            now,
        )
        .await?;
        Ok(())
    }

    /// Enqueue one `balance-updated` per balance row.
    pub async fn balances_updated<U>(
        &self,
        tx: &mut U,
        balances: &[WalletBalance],
        reason: &str,
        order_id: Option<&OrderId>,
        now: DateTime<Utc>,
    ) -> SettlementResult<()>
    where
        U: OutboxRepository + ?Sized,
    {
        for balance in balances {
            self.enqueue(
                tx,
                &BalanceUpdatedV1::from_balance(balance, reason, order_id),
                now,
            )
            .await?;
        }
        Ok(())
    }
}
