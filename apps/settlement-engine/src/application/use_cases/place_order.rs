//! Place Order Use Case
//!
//! Risk gate, then lifecycle creation, then audit. A risk rejection stops
//! the pipeline before anything is written.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::application::ports::{
    AuditLogPort, AuditRecord, RiskDecision, RiskGatePort, TransactionManager,
};
use crate::application::services::OrderLifecycleService;
use crate::domain::order_lifecycle::{CreateOrderCommand, Order};
use crate::error::{SettlementError, SettlementResult};

/// Use case for accepting a new order.
pub struct PlaceOrderUseCase<T, R, A>
where
    T: TransactionManager,
    R: RiskGatePort,
    A: AuditLogPort,
{
    risk_gate: Arc<R>,
    lifecycle: Arc<OrderLifecycleService<T>>,
    audit_log: Arc<A>,
}

impl<T, R, A> PlaceOrderUseCase<T, R, A>
where
    T: TransactionManager,
    R: RiskGatePort,
    A: AuditLogPort,
{
    /// Create a new PlaceOrderUseCase.
    pub const fn new(
        risk_gate: Arc<R>,
        lifecycle: Arc<OrderLifecycleService<T>>,
        audit_log: Arc<A>,
    ) -> Self {
        Self {
            risk_gate,
            lifecycle,
            audit_log,
        }
    }

    /// Execute the use case.
    pub async fn execute(&self, command: CreateOrderCommand) -> SettlementResult<Order> {
        command.validate()?;

        if let RiskDecision::Rejected { code, message } = self.risk_gate.validate(&command).await {
            tracing::info!(
                account_id = %command.account_id,
                instrument = %command.instrument,
                code = %code,
                "Order refused by risk gate"
            );
            return Err(SettlementError::RiskRejected { code, message });
        }

        let order = self.lifecycle.create(command).await?;

        self.audit_log
            .record(AuditRecord {
                action: "ORDER_PLACED",
                account_id: order.account_id().clone(),
                order_id: Some(order.id().clone()),
                details: json!({
                    "instrument": order.instrument(),
                    "side": order.side(),
                    "order_type": order.order_type(),
                    "quantity": order.quantity(),
                    "limit_price": order.limit_price(),
                    "exchange_name": order.exchange_name(),
                }),
                at: Utc::now(),
            })
            .await;

        Ok(order)
    }
}
