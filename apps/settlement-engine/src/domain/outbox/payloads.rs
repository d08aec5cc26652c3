//! Versioned outbox payloads.
//!
//! Each payload names its event type and schema version, exposes the
//! natural key used as correlation id and partition key, and validates
//! itself before it is enqueued.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::errors::OutboxError;
use crate::domain::execution::Execution;
use crate::domain::order_lifecycle::{Order, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{AccountId, ExecutionId, OrderId, OutboxEventId};
use crate::domain::wallet::WalletBalance;

code_enum! {
    /// Published event families.
    pub enum EventType("event_type") {
        /// A new order awaits exchange submission.
        OrderSubmitted => "order-submitted",
        /// An order changed status or fill quantity.
        OrderUpdated => "order-updated",
        /// A fill was applied.
        ExecutionRecorded => "execution-recorded",
        /// A wallet balance changed.
        BalanceUpdated => "balance-updated",
    }
}

code_enum! {
    /// Aggregate an outbox row announces a change of.
    pub enum AggregateType("aggregate_type") {
        /// Order row.
        Order => "ORDER",
        /// Execution row.
        Execution => "EXECUTION",
        /// Wallet balance row.
        WalletBalance => "WALLET_BALANCE",
    }
}

/// Broker topic for an event type and schema version.
#[must_use]
pub fn topic_name(prefix: &str, event_type: EventType, schema_version: u32) -> String {
    format!("{prefix}.{event_type}.v{schema_version}")
}

/// A typed, versioned event body.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    /// Event family.
    const EVENT_TYPE: EventType;
    /// Schema version.
    const SCHEMA_VERSION: u32;
    /// Aggregate announced.
    const AGGREGATE_TYPE: AggregateType;

    /// Aggregate id.
    fn aggregate_id(&self) -> String;

    /// Natural key: correlation id and partition key.
    fn natural_key(&self) -> String;

    /// Schema checks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` describing the first failed check.
    fn validate(&self) -> Result<(), OutboxError>;

    /// Build an `InvalidPayload` error for this payload type.
    fn invalid(message: impl Into<String>) -> OutboxError {
        OutboxError::InvalidPayload {
            event_type: Self::EVENT_TYPE,
            schema_version: Self::SCHEMA_VERSION,
            message: message.into(),
        }
    }
}

/// Envelope published around every payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    /// Outbox row id; consumers dedupe on it.
    pub event_id: OutboxEventId,
    /// Event family.
    pub event_type: EventType,
    /// Schema version.
    pub schema_version: u32,
    /// Natural key of the payload.
    pub correlation_id: String,
    /// When the change was committed.
    pub occurred_at: DateTime<Utc>,
    /// Body.
    pub payload: P,
}

fn require_non_empty<P: EventPayload>(field: &str, value: &str) -> Result<(), OutboxError> {
    if value.trim().is_empty() {
        return Err(P::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_non_negative<P: EventPayload>(field: &str, value: Decimal) -> Result<(), OutboxError> {
    if value < Decimal::ZERO {
        return Err(P::invalid(format!("{field} must not be negative")));
    }
    Ok(())
}

/// `order-submitted` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmittedV1 {
    /// Order id.
    pub order_id: OrderId,
    /// Account.
    pub account_id: AccountId,
    /// Exchange symbol.
    pub instrument: String,
    /// Side.
    pub side: OrderSide,
    /// Type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Client order id sent to the exchange.
    pub client_order_id: String,
    /// Target exchange.
    pub exchange_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl OrderSubmittedV1 {
    /// Snapshot a freshly created order.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            account_id: order.account_id().clone(),
            instrument: order.instrument().to_string(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity(),
            limit_price: order.limit_price(),
            client_order_id: order.outbound_client_order_id().to_string(),
            exchange_name: order.exchange_name().to_string(),
            created_at: order.created_at(),
        }
    }
}

impl EventPayload for OrderSubmittedV1 {
    const EVENT_TYPE: EventType = EventType::OrderSubmitted;
    const SCHEMA_VERSION: u32 = 1;
    const AGGREGATE_TYPE: AggregateType = AggregateType::Order;

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }

    fn natural_key(&self) -> String {
        self.order_id.to_string()
    }

    fn validate(&self) -> Result<(), OutboxError> {
        require_non_empty::<Self>("order_id", self.order_id.as_str())?;
        require_non_empty::<Self>("instrument", &self.instrument)?;
        require_non_empty::<Self>("exchange_name", &self.exchange_name)?;
        if self.quantity <= Decimal::ZERO {
            return Err(Self::invalid("quantity must be positive"));
        }
        if self.order_type.requires_limit_price() != self.limit_price.is_some() {
            return Err(Self::invalid("limit_price must be present iff LIMIT"));
        }
        Ok(())
    }
}

/// `order-updated` v1: status and fill progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedV1 {
    /// Order id.
    pub order_id: OrderId,
    /// Account.
    pub account_id: AccountId,
    /// Current status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Update time.
    pub updated_at: DateTime<Utc>,
}

impl OrderUpdatedV1 {
    /// Snapshot an order after a transition.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            account_id: order.account_id().clone(),
            status: order.status(),
            filled_quantity: order.filled_quantity(),
            updated_at: order.updated_at(),
        }
    }
}

impl EventPayload for OrderUpdatedV1 {
    const EVENT_TYPE: EventType = EventType::OrderUpdated;
    const SCHEMA_VERSION: u32 = 1;
    const AGGREGATE_TYPE: AggregateType = AggregateType::Order;

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }

    fn natural_key(&self) -> String {
        self.order_id.to_string()
    }

    fn validate(&self) -> Result<(), OutboxError> {
        require_non_empty::<Self>("order_id", self.order_id.as_str())?;
        require_non_negative::<Self>("filled_quantity", self.filled_quantity)
    }
}

/// `order-updated` v2: adds the previous status, quantities, exchange
/// identity and reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedV2 {
    /// Order id.
    pub order_id: OrderId,
    /// Account.
    pub account_id: AccountId,
    /// Exchange symbol.
    pub instrument: String,
    /// Status before the change.
    pub previous_status: OrderStatus,
    /// Status after the change.
    pub status: OrderStatus,
    /// Order quantity.
    pub quantity: Decimal,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Open quantity.
    pub remaining_quantity: Decimal,
    /// Exchange name.
    pub exchange_name: String,
    /// Exchange order id, once acknowledged.
    pub exchange_order_id: Option<String>,
    /// Why the order changed, when known.
    pub reason: Option<String>,
    /// Update time.
    pub updated_at: DateTime<Utc>,
}

impl OrderUpdatedV2 {
    /// Snapshot an order after a transition from `previous_status`.
    #[must_use]
    pub fn from_order(order: &Order, previous_status: OrderStatus, reason: Option<&str>) -> Self {
        Self {
            order_id: order.id().clone(),
            account_id: order.account_id().clone(),
            instrument: order.instrument().to_string(),
            previous_status,
            status: order.status(),
            quantity: order.quantity(),
            filled_quantity: order.filled_quantity(),
            remaining_quantity: order.remaining_quantity(),
            exchange_name: order.exchange_name().to_string(),
            exchange_order_id: order.exchange_order_id().map(str::to_string),
            reason: reason.map(str::to_string),
            updated_at: order.updated_at(),
        }
    }
}

impl EventPayload for OrderUpdatedV2 {
    const EVENT_TYPE: EventType = EventType::OrderUpdated;
    const SCHEMA_VERSION: u32 = 2;
    const AGGREGATE_TYPE: AggregateType = AggregateType::Order;

    fn aggregate_id(&self) -> String {
        self.order_id.to_string()
    }

    fn natural_key(&self) -> String {
        self.order_id.to_string()
    }

    fn validate(&self) -> Result<(), OutboxError> {
        require_non_empty::<Self>("order_id", self.order_id.as_str())?;
        require_non_negative::<Self>("filled_quantity", self.filled_quantity)?;
        require_non_negative::<Self>("remaining_quantity", self.remaining_quantity)?;
        if self.filled_quantity + self.remaining_quantity != self.quantity {
            return Err(Self::invalid("filled + remaining must equal quantity"));
        }
        Ok(())
    }
}

/// `execution-recorded` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecordedV1 {
    /// Execution id.
    pub execution_id: ExecutionId,
    /// Order id.
    pub order_id: OrderId,
    /// Account.
    pub account_id: AccountId,
    /// Exchange symbol.
    pub instrument: String,
    /// Exchange name.
    pub exchange_name: String,
    /// Exchange trade id.
    pub trade_id: String,
    /// Side.
    pub side: OrderSide,
    /// Base quantity.
    pub quantity: Decimal,
    /// Price.
    pub price: Decimal,
    /// Fee asset.
    pub fee_asset: Option<String>,
    /// Fee amount.
    pub fee_amount: Decimal,
    /// Trade time.
    pub executed_at: DateTime<Utc>,
}

impl From<&Execution> for ExecutionRecordedV1 {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id.clone(),
            order_id: execution.order_id.clone(),
            account_id: execution.account_id.clone(),
            instrument: execution.instrument.clone(),
            exchange_name: execution.exchange_name.clone(),
            trade_id: execution.trade_id.clone(),
            side: execution.side,
            quantity: execution.quantity,
            price: execution.price,
            fee_asset: execution.fee_asset.clone(),
            fee_amount: execution.fee_amount,
            executed_at: execution.executed_at,
        }
    }
}

impl EventPayload for ExecutionRecordedV1 {
    const EVENT_TYPE: EventType = EventType::ExecutionRecorded;
    const SCHEMA_VERSION: u32 = 1;
    const AGGREGATE_TYPE: AggregateType = AggregateType::Execution;

    fn aggregate_id(&self) -> String {
        self.execution_id.to_string()
    }

    fn natural_key(&self) -> String {
        self.order_id.to_string()
    }

    fn validate(&self) -> Result<(), OutboxError> {
        require_non_empty::<Self>("order_id", self.order_id.as_str())?;
        require_non_empty::<Self>("trade_id", &self.trade_id)?;
        if self.quantity <= Decimal::ZERO || self.price <= Decimal::ZERO {
            return Err(Self::invalid("quantity and price must be positive"));
        }
        require_non_negative::<Self>("fee_amount", self.fee_amount)
    }
}

/// `balance-updated` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdatedV1 {
    /// Account.
    pub account_id: AccountId,
    /// Asset.
    pub asset: String,
    /// Available after the change.
    pub available: Decimal,
    /// Reserved after the change.
    pub reserved: Decimal,
    /// What moved the balance (`ORDER_RESERVED`, `EXECUTION_SETTLED`, ...).
    pub reason: String,
    /// Order that caused the change.
    pub order_id: Option<OrderId>,
    /// Update time.
    pub updated_at: DateTime<Utc>,
}

impl BalanceUpdatedV1 {
    /// Snapshot a balance row.
    #[must_use]
    pub fn from_balance(balance: &WalletBalance, reason: &str, order_id: Option<&OrderId>) -> Self {
        Self {
            account_id: balance.account_id.clone(),
            asset: balance.asset.clone(),
            available: balance.available,
            reserved: balance.reserved,
            reason: reason.to_string(),
            order_id: order_id.cloned(),
            updated_at: balance.updated_at,
        }
    }
}

impl EventPayload for BalanceUpdatedV1 {
    const EVENT_TYPE: EventType = EventType::BalanceUpdated;
    const SCHEMA_VERSION: u32 = 1;
    const AGGREGATE_TYPE: AggregateType = AggregateType::WalletBalance;

    fn aggregate_id(&self) -> String {
        format!("{}:{}", self.account_id, self.asset)
    }

    fn natural_key(&self) -> String {
        self.account_id.to_string()
    }

    fn validate(&self) -> Result<(), OutboxError> {
        require_non_empty::<Self>("account_id", self.account_id.as_str())?;
        require_non_empty::<Self>("asset", &self.asset)?;
        require_non_negative::<Self>("available", self.available)?;
        require_non_negative::<Self>("reserved", self.reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn topic_includes_type_and_version() {
        assert_eq!(
            topic_name("settlement", EventType::OrderUpdated, 2),
            "settlement.order-updated.v2"
        );
    }

    #[test]
    fn negative_balance_fails_validation() {
        let payload = BalanceUpdatedV1 {
            account_id: AccountId::new("a-1"),
            asset: "USDT".to_string(),
            available: dec!(-1),
            reserved: dec!(0),
            reason: "EXECUTION_SETTLED".to_string(),
            order_id: None,
            updated_at: Utc::now(),
        };
        let err = payload.validate().unwrap_err();
        assert!(matches!(
            err,
            OutboxError::InvalidPayload {
                event_type: EventType::BalanceUpdated,
                schema_version: 1,
                ..
            }
        ));
        assert_eq!(payload.natural_key(), "a-1");
    }

    #[test]
    fn order_updated_v2_checks_quantity_split() {
        let payload = OrderUpdatedV2 {
            order_id: OrderId::new("o-1"),
            account_id: AccountId::new("a-1"),
            instrument: "BTCUSDT".to_string(),
            previous_status: OrderStatus::Acknowledged,
            status: OrderStatus::PartiallyFilled,
            quantity: dec!(1),
            filled_quantity: dec!(0.4),
            remaining_quantity: dec!(0.5),
            exchange_name: "binance".to_string(),
            exchange_order_id: Some("9".to_string()),
            reason: None,
            updated_at: Utc::now(),
        };
        assert!(payload.validate().is_err());
    }
}
