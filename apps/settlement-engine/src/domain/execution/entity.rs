//! Execution facts and the reports they are built from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_lifecycle::{OrderError, OrderSide, OrderStatus};
use crate::domain::shared::{AccountId, ExecutionId, OrderId};

/// A fill notification as received from the exchange, before it is mapped
/// to a local order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Exchange that produced the fill.
    pub exchange_name: String,
    /// Exchange symbol.
    pub instrument: String,
    /// Exchange trade id, unique per `(exchange, instrument)`.
    pub trade_id: String,
    /// Exchange-assigned order id.
    pub exchange_order_id: Option<String>,
    /// Client order id echoed by the exchange.
    pub client_order_id: Option<String>,
    /// Side of the filled order.
    pub side: OrderSide,
    /// Base quantity of this fill.
    pub quantity: Decimal,
    /// Fill price.
    pub price: Decimal,
    /// Asset the fee was charged in.
    pub fee_asset: Option<String>,
    /// Fee amount (zero when no fee).
    pub fee_amount: Decimal,
    /// Order status the exchange reported alongside the fill.
    pub reported_status: Option<OrderStatus>,
    /// Trade time.
    pub executed_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Reject reports that cannot be applied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` naming the offending field.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.exchange_name.trim().is_empty() {
            return Err(OrderError::invalid("exchange_name", "must not be empty"));
        }
        if self.instrument.trim().is_empty() {
            return Err(OrderError::invalid("instrument", "must not be empty"));
        }
        if self.trade_id.trim().is_empty() {
            return Err(OrderError::invalid("trade_id", "must not be empty"));
        }
        if self.exchange_order_id.is_none() && self.client_order_id.is_none() {
            return Err(OrderError::invalid(
                "exchange_order_id",
                "report carries neither exchange nor client order id",
            ));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("quantity", "must be positive"));
        }
        if self.price <= Decimal::ZERO {
            return Err(OrderError::invalid("price", "must be positive"));
        }
        if self.fee_amount < Decimal::ZERO {
            return Err(OrderError::invalid("fee_amount", "must not be negative"));
        }
        if self.fee_amount > Decimal::ZERO && self.fee_asset.is_none() {
            return Err(OrderError::invalid("fee_asset", "required when a fee is charged"));
        }
        Ok(())
    }
}

/// A non-fill order status reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Exchange that reported the status.
    pub exchange_name: String,
    /// Exchange symbol.
    pub instrument: String,
    /// Exchange-assigned order id.
    pub exchange_order_id: Option<String>,
    /// Client order id echoed by the exchange.
    pub client_order_id: Option<String>,
    /// Mapped status.
    pub status: OrderStatus,
    /// Exchange reason text, if any.
    pub reason: Option<String>,
    /// Report time.
    pub reported_at: DateTime<Utc>,
}

/// An applied fill. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Row identifier.
    pub id: ExecutionId,
    /// Local order the fill belongs to.
    pub order_id: OrderId,
    /// Owning account.
    pub account_id: AccountId,
    /// Exchange symbol.
    pub instrument: String,
    /// Exchange trade id.
    pub trade_id: String,
    /// Exchange name.
    pub exchange_name: String,
    /// Exchange-assigned order id.
    pub exchange_order_id: Option<String>,
    /// Side of the order.
    pub side: OrderSide,
    /// Base quantity.
    pub quantity: Decimal,
    /// Fill price.
    pub price: Decimal,
    /// Fee asset.
    pub fee_asset: Option<String>,
    /// Fee amount.
    pub fee_amount: Decimal,
    /// Trade time.
    pub executed_at: DateTime<Utc>,
}

impl Execution {
    /// Build the execution row for `report` applied to `order_id`.
    #[must_use]
    pub fn from_report(report: &ExecutionReport, order_id: OrderId, account_id: AccountId) -> Self {
        Self {
            id: ExecutionId::generate(),
            order_id,
            account_id,
            instrument: report.instrument.clone(),
            trade_id: report.trade_id.clone(),
            exchange_name: report.exchange_name.clone(),
            exchange_order_id: report.exchange_order_id.clone(),
            side: report.side,
            quantity: report.quantity,
            price: report.price,
            fee_asset: report.fee_asset.clone(),
            fee_amount: report.fee_amount,
            executed_at: report.executed_at,
        }
    }

    /// Quote notional of the fill.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// Result of inserting an execution under the dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row written.
    Inserted,
    /// `(exchange_name, instrument, trade_id)` already present.
    Duplicate,
}

/// Result of ingesting one fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Fill applied.
    Inserted {
        /// New execution row.
        execution_id: ExecutionId,
        /// Order it was applied to.
        order_id: OrderId,
        /// Order status after the fill.
        status: OrderStatus,
    },
    /// Trade already ingested; nothing changed.
    Duplicate,
    /// No local order matches the report.
    Unmapped,
}

impl IngestOutcome {
    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Duplicate => "duplicate",
            Self::Unmapped => "unmapped",
        }
    }
}

/// Result of reconciling a non-fill status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Order moved to the given status.
    Applied(OrderStatus),
    /// Order already in the reported status.
    Unchanged,
    /// No local order matches the report.
    Unmapped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn report() -> ExecutionReport {
        ExecutionReport {
            exchange_name: "binance".to_string(),
            instrument: "BTCUSDT".to_string(),
            trade_id: "t-1".to_string(),
            exchange_order_id: Some("123".to_string()),
            client_order_id: None,
            side: OrderSide::Buy,
            quantity: dec!(0.01),
            price: dec!(50000),
            fee_asset: Some("USDT".to_string()),
            fee_amount: dec!(1),
            reported_status: None,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn valid_report_passes() {
        assert!(report().validate().is_ok());
    }

    #[test]
    fn report_without_any_order_reference_is_rejected() {
        let mut r = report();
        r.exchange_order_id = None;
        assert!(r.validate().is_err());
    }

    #[test]
    fn fee_without_asset_is_rejected() {
        let mut r = report();
        r.fee_asset = None;
        assert!(r.validate().is_err());

        r.fee_amount = Decimal::ZERO;
        assert!(r.validate().is_ok());
    }

    #[test]
    fn execution_copies_report_economics() {
        let exec = Execution::from_report(&report(), OrderId::new("o-1"), AccountId::new("a-1"));
        assert_eq!(exec.notional(), dec!(500.00));
        assert_eq!(exec.trade_id, "t-1");
    }
}
