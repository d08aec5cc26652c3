//! Order Aggregate Root
//!
//! The Order aggregate owns the lifecycle of a spot order: creation,
//! exchange acknowledgement, fills, cancellation and rejection. Every
//! mutation goes through [`OrderStateMachine`] so that status always agrees
//! with `filled_quantity`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::order_lifecycle::errors::OrderError;
use crate::domain::order_lifecycle::services::OrderStateMachine;
use crate::domain::order_lifecycle::value_objects::{OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{AccountId, AssetPair, OrderId};

/// Command to create a new order.
///
/// Risk approval is expected to have happened before this command is built.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderCommand {
    /// Identity to use; generated when absent.
    pub order_id: Option<OrderId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Exchange symbol, e.g. `BTCUSDT`.
    pub instrument: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market or limit.
    pub order_type: OrderType,
    /// Base quantity.
    pub quantity: Decimal,
    /// Limit price, required iff `order_type` is `LIMIT`.
    pub limit_price: Option<Decimal>,
    /// Caller-supplied client order id.
    pub client_order_id: Option<String>,
    /// Exchange the order is routed to.
    pub exchange_name: String,
}

impl CreateOrderCommand {
    /// Validate the command parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` naming the first offending field.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.account_id.as_str().trim().is_empty() {
            return Err(OrderError::invalid("account_id", "must not be empty"));
        }
        if self.instrument.trim().is_empty() {
            return Err(OrderError::invalid("instrument", "must not be empty"));
        }
        if self.exchange_name.trim().is_empty() {
            return Err(OrderError::invalid("exchange_name", "must not be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("quantity", "must be positive"));
        }

        match (self.order_type.requires_limit_price(), self.limit_price) {
            (true, None) => {
                return Err(OrderError::invalid(
                    "limit_price",
                    "limit price required for limit orders",
                ));
            }
            (true, Some(price)) if price <= Decimal::ZERO => {
                return Err(OrderError::invalid("limit_price", "must be positive"));
            }
            (false, Some(_)) => {
                return Err(OrderError::invalid(
                    "limit_price",
                    "market orders must not carry a limit price",
                ));
            }
            _ => {}
        }

        if let Some(client_order_id) = &self.client_order_id
            && client_order_id.trim().is_empty()
        {
            return Err(OrderError::invalid("client_order_id", "must not be blank"));
        }

        Ok(())
    }
}

/// Parameters for reconstituting an Order from storage.
#[derive(Debug, Clone)]
pub struct ReconstitutedOrderParams {
    /// Order identifier.
    pub id: OrderId,
    /// Owning account.
    pub account_id: AccountId,
    /// Exchange symbol.
    pub instrument: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Total quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Current status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Caller-supplied client order id.
    pub client_order_id: Option<String>,
    /// Routed exchange.
    pub exchange_name: String,
    /// Exchange-assigned order id.
    pub exchange_order_id: Option<String>,
    /// Client order id as echoed by the exchange.
    pub exchange_client_order_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A status change produced by an aggregate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before.
    pub from: OrderStatus,
    /// Status after.
    pub to: OrderStatus,
}

/// Result of applying a fill quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTransition {
    /// Status change.
    pub transition: Transition,
    /// Filled quantity before the fill.
    pub prior_filled: Decimal,
    /// Filled quantity after the fill (capped at the order quantity).
    pub new_filled: Decimal,
}

/// Result of an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The order moved from `NEW` to `ACK`.
    Acknowledged(Transition),
    /// Replay of an identical acknowledgement; nothing changed.
    AlreadyAcknowledged,
}

/// Order Aggregate Root.
#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    account_id: AccountId,
    instrument: String,
    side: OrderSide,
    order_type: OrderType,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    status: OrderStatus,
    filled_quantity: Decimal,
    client_order_id: Option<String>,
    exchange_name: String,
    exchange_order_id: Option<String>,
    exchange_client_order_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order from a command.
    ///
    /// # Errors
    ///
    /// Returns error if command validation fails.
    pub fn new(cmd: CreateOrderCommand, now: DateTime<Utc>) -> Result<Self, OrderError> {
        cmd.validate()?;

        Ok(Self {
            id: cmd.order_id.unwrap_or_else(OrderId::generate),
            account_id: cmd.account_id,
            instrument: cmd.instrument.trim().to_uppercase(),
            side: cmd.side,
            order_type: cmd.order_type,
            quantity: cmd.quantity,
            limit_price: cmd.limit_price,
            status: OrderStatus::New,
            filled_quantity: Decimal::ZERO,
            client_order_id: cmd.client_order_id,
            exchange_name: cmd.exchange_name,
            exchange_order_id: None,
            exchange_client_order_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstitute an order from stored state.
    #[must_use]
    pub fn reconstitute(params: ReconstitutedOrderParams) -> Self {
        Self {
            id: params.id,
            account_id: params.account_id,
            instrument: params.instrument,
            side: params.side,
            order_type: params.order_type,
            quantity: params.quantity,
            limit_price: params.limit_price,
            status: params.status,
            filled_quantity: params.filled_quantity,
            client_order_id: params.client_order_id,
            exchange_name: params.exchange_name,
            exchange_order_id: params.exchange_order_id,
            exchange_client_order_id: params.exchange_client_order_id,
            created_at: params.created_at,
            updated_at: params.updated_at,
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Get the order ID.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Get the owning account.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Get the instrument symbol.
    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Get the order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Get the order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Get the quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Get the limit price.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Get the cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Get the caller-supplied client order id.
    #[must_use]
    pub fn client_order_id(&self) -> Option<&str> {
        self.client_order_id.as_deref()
    }

    /// Client order id to send to the exchange.
    ///
    /// Falls back to the internal order id so exchange reports can always be
    /// mapped back.
    #[must_use]
    pub fn outbound_client_order_id(&self) -> &str {
        self.client_order_id
            .as_deref()
            .unwrap_or_else(|| self.id.as_str())
    }

    /// Get the routed exchange.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    /// Get the exchange-assigned order id.
    #[must_use]
    pub fn exchange_order_id(&self) -> Option<&str> {
        self.exchange_order_id.as_deref()
    }

    /// Get the client order id echoed by the exchange.
    #[must_use]
    pub fn exchange_client_order_id(&self) -> Option<&str> {
        self.exchange_client_order_id.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Asset and amount this order must hold in reserve.
    ///
    /// BUY LIMIT reserves quote notional at the limit price, SELL reserves
    /// the base quantity, BUY MARKET has no known notional and reserves
    /// nothing.
    #[must_use]
    pub fn reservation_requirement(&self, pair: &AssetPair) -> Option<(String, Decimal)> {
        match (self.side, self.limit_price) {
            (OrderSide::Buy, Some(price)) => Some((pair.quote.clone(), self.quantity * price)),
            (OrderSide::Buy, None) => None,
            (OrderSide::Sell, _) => Some((pair.base.clone(), self.quantity)),
        }
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// Record the exchange acknowledgement.
    ///
    /// # Errors
    ///
    /// `AmbiguousAcknowledgement` if already acknowledged with different
    /// identifiers, `StaleAcknowledgement` if the order is past `NEW`.
    pub fn acknowledge(
        &mut self,
        exchange_name: &str,
        exchange_order_id: &str,
        exchange_client_order_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AckOutcome, OrderError> {
        if exchange_order_id.trim().is_empty() {
            return Err(OrderError::invalid("exchange_order_id", "must not be empty"));
        }

        if self.status == OrderStatus::Acknowledged {
            let same = self.exchange_name == exchange_name
                && self.exchange_order_id.as_deref() == Some(exchange_order_id)
                && self.exchange_client_order_id.as_deref() == exchange_client_order_id;
            if same {
                return Ok(AckOutcome::AlreadyAcknowledged);
            }
            return Err(OrderError::AmbiguousAcknowledgement {
                order_id: self.id.to_string(),
                recorded: self.exchange_order_id.clone().unwrap_or_default(),
                received: exchange_order_id.to_string(),
            });
        }

        if self.status != OrderStatus::New {
            return Err(OrderError::StaleAcknowledgement {
                order_id: self.id.to_string(),
                status: self.status,
            });
        }

        OrderStateMachine::validate_transition(self.status, OrderStatus::Acknowledged)?;

        let transition = Transition {
            from: self.status,
            to: OrderStatus::Acknowledged,
        };
        self.exchange_name = exchange_name.to_string();
        self.exchange_order_id = Some(exchange_order_id.to_string());
        self.exchange_client_order_id = exchange_client_order_id.map(str::to_string);
        self.status = OrderStatus::Acknowledged;
        self.updated_at = now;

        Ok(AckOutcome::Acknowledged(transition))
    }

    /// Cancel the order on behalf of `account_id`.
    ///
    /// # Errors
    ///
    /// `AccountMismatch` if another account asks, `AlreadyTerminal` if the
    /// order can no longer change.
    pub fn cancel(
        &mut self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        if &self.account_id != account_id {
            return Err(OrderError::AccountMismatch {
                order_id: self.id.to_string(),
            });
        }
        self.transition_to_terminal(OrderStatus::Canceled, now)
    }

    /// Reject the order after the exchange refused it.
    ///
    /// # Errors
    ///
    /// Returns error unless the order is still `NEW`.
    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        self.transition_to_terminal(OrderStatus::Rejected, now)
    }

    /// Apply a fill of `fill_quantity`.
    ///
    /// The cumulative filled quantity is capped at the order quantity.
    ///
    /// # Errors
    ///
    /// Returns error if the quantity is not positive or no legal transition
    /// exists; the aggregate is left untouched on error.
    pub fn apply_fill(
        &mut self,
        fill_quantity: Decimal,
        reported_status: Option<OrderStatus>,
        now: DateTime<Utc>,
    ) -> Result<FillTransition, OrderError> {
        if fill_quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("fill_quantity", "must be positive"));
        }

        let prior_filled = self.filled_quantity;
        let new_filled = (prior_filled + fill_quantity).min(self.quantity);
        let next = OrderStateMachine::next_status(
            self.status,
            reported_status,
            prior_filled,
            new_filled,
            self.quantity,
        )?;

        let transition = Transition {
            from: self.status,
            to: next,
        };
        self.filled_quantity = new_filled;
        self.status = next;
        self.updated_at = now;

        Ok(FillTransition {
            transition,
            prior_filled,
            new_filled,
        })
    }

    /// Apply an exchange-reported status that carries no fill.
    ///
    /// Returns `Ok(None)` when the report matches the current status.
    ///
    /// # Errors
    ///
    /// Returns error if the reported status is not reachable.
    pub fn apply_reported_status(
        &mut self,
        reported: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Transition>, OrderError> {
        if reported == self.status {
            return Ok(None);
        }

        let next = OrderStateMachine::next_status(
            self.status,
            Some(reported),
            self.filled_quantity,
            self.filled_quantity,
            self.quantity,
        )?;
        if next == self.status {
            return Ok(None);
        }

        let transition = Transition {
            from: self.status,
            to: next,
        };
        self.status = next;
        self.updated_at = now;
        Ok(Some(transition))
    }

    fn transition_to_terminal(
        &mut self,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                order_id: self.id.to_string(),
                status: self.status,
            });
        }
        OrderStateMachine::validate_transition(self.status, to)?;

        let transition = Transition {
            from: self.status,
            to,
        };
        self.status = to;
        self.updated_at = now;
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_buy() -> CreateOrderCommand {
        CreateOrderCommand {
            order_id: None,
            account_id: AccountId::new("acc-1"),
            instrument: "btcusdt".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(0.1),
            limit_price: Some(dec!(45000)),
            client_order_id: None,
            exchange_name: "binance".to_string(),
        }
    }

    fn acknowledged() -> Order {
        let mut order = Order::new(limit_buy(), Utc::now()).unwrap();
        order
            .acknowledge("binance", "12345", Some("cli-1"), Utc::now())
            .unwrap();
        order
    }

    #[test]
    fn new_order_starts_unfilled() {
        let order = Order::new(limit_buy(), Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::New);
        assert_eq!(order.filled_quantity(), Decimal::ZERO);
        assert_eq!(order.instrument(), "BTCUSDT");
        assert_eq!(order.outbound_client_order_id(), order.id().as_str());
    }

    #[test]
    fn explicit_identity_is_kept() {
        let mut cmd = limit_buy();
        cmd.order_id = Some(OrderId::new("ord-fixed"));
        let order = Order::new(cmd, Utc::now()).unwrap();
        assert_eq!(order.id().as_str(), "ord-fixed");
    }

    #[test]
    fn limit_order_without_price_is_invalid() {
        let mut cmd = limit_buy();
        cmd.limit_price = None;
        let err = Order::new(cmd, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvalidParameters { ref field, .. } if field == "limit_price"));
    }

    #[test]
    fn market_order_with_price_is_invalid() {
        let mut cmd = limit_buy();
        cmd.order_type = OrderType::Market;
        assert!(Order::new(cmd, Utc::now()).is_err());
    }

    #[test]
    fn reservation_requirement_by_side() {
        let pair = AssetPair::new("BTC", "USDT");
        let order = Order::new(limit_buy(), Utc::now()).unwrap();
        assert_eq!(
            order.reservation_requirement(&pair),
            Some(("USDT".to_string(), dec!(4500.0)))
        );

        let mut sell = limit_buy();
        sell.side = OrderSide::Sell;
        let order = Order::new(sell, Utc::now()).unwrap();
        assert_eq!(
            order.reservation_requirement(&pair),
            Some(("BTC".to_string(), dec!(0.1)))
        );

        let mut market = limit_buy();
        market.order_type = OrderType::Market;
        market.limit_price = None;
        let order = Order::new(market, Utc::now()).unwrap();
        assert_eq!(order.reservation_requirement(&pair), None);
    }

    #[test]
    fn identical_ack_replay_is_a_no_op() {
        let mut order = acknowledged();
        let outcome = order
            .acknowledge("binance", "12345", Some("cli-1"), Utc::now())
            .unwrap();
        assert_eq!(outcome, AckOutcome::AlreadyAcknowledged);
    }

    #[test]
    fn ack_with_different_ids_is_ambiguous() {
        let mut order = acknowledged();
        let err = order
            .acknowledge("binance", "99999", Some("cli-1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::AmbiguousAcknowledgement { .. }));
    }

    #[test]
    fn ack_after_fill_is_stale() {
        let mut order = acknowledged();
        order.apply_fill(dec!(0.05), None, Utc::now()).unwrap();
        let err = order
            .acknowledge("binance", "12345", Some("cli-1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::StaleAcknowledgement { .. }));
    }

    #[test]
    fn fills_accumulate_and_cap_at_quantity() {
        let mut order = acknowledged();
        let first = order.apply_fill(dec!(0.04), None, Utc::now()).unwrap();
        assert_eq!(first.transition.to, OrderStatus::PartiallyFilled);

        let second = order.apply_fill(dec!(0.08), None, Utc::now()).unwrap();
        assert_eq!(second.prior_filled, dec!(0.04));
        assert_eq!(second.new_filled, dec!(0.1));
        assert_eq!(order.status(), OrderStatus::Filled);
    }

    #[test]
    fn fill_on_new_order_leaves_state_untouched() {
        let mut order = Order::new(limit_buy(), Utc::now()).unwrap();
        let before = order.clone();
        assert!(order.apply_fill(dec!(0.1), Some(OrderStatus::Filled), Utc::now()).is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn cancel_checks_account_and_terminal_state() {
        let mut order = acknowledged();
        let err = order.cancel(&AccountId::new("other"), Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::AccountMismatch { .. }));

        let transition = order.cancel(&AccountId::new("acc-1"), Utc::now()).unwrap();
        assert_eq!(transition.to, OrderStatus::Canceled);

        let err = order.cancel(&AccountId::new("acc-1"), Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::AlreadyTerminal { .. }));
    }

    #[test]
    fn reject_only_from_new() {
        let mut order = Order::new(limit_buy(), Utc::now()).unwrap();
        assert_eq!(order.reject(Utc::now()).unwrap().to, OrderStatus::Rejected);

        let mut order = acknowledged();
        assert!(order.reject(Utc::now()).is_err());
    }

    #[test]
    fn reported_status_same_as_current_is_ignored() {
        let mut order = acknowledged();
        assert_eq!(
            order
                .apply_reported_status(OrderStatus::Acknowledged, Utc::now())
                .unwrap(),
            None
        );
        let transition = order
            .apply_reported_status(OrderStatus::Canceled, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(transition.to, OrderStatus::Canceled);
    }
}
