//! Exchange Port (Driven Port)
//!
//! Interface for placing, canceling and querying spot orders and for
//! reading recent trades.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::execution::ExecutionReport;
use crate::domain::order_lifecycle::{Order, OrderSide, OrderStatus, OrderType};

/// Request to place an order on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Client order id the exchange will echo back.
    pub client_order_id: String,
    /// Exchange symbol.
    pub instrument: String,
    /// Side.
    pub side: OrderSide,
    /// Type.
    pub order_type: OrderType,
    /// Base quantity.
    pub quantity: Decimal,
    /// Limit price (limit orders).
    pub limit_price: Option<Decimal>,
}

impl PlaceOrderRequest {
    /// Build the request for a local order.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            client_order_id: order.outbound_client_order_id().to_string(),
            instrument: order.instrument().to_string(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity(),
            limit_price: order.limit_price(),
        }
    }
}

/// Identifies one exchange order for cancel and query calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLookup {
    /// Exchange symbol.
    pub instrument: String,
    /// Exchange order id (preferred).
    pub exchange_order_id: Option<String>,
    /// Client order id (fallback).
    pub client_order_id: Option<String>,
}

impl OrderLookup {
    /// Lookup for a local order.
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        Self {
            instrument: order.instrument().to_string(),
            exchange_order_id: order.exchange_order_id().map(str::to_string),
            client_order_id: Some(
                order
                    .exchange_client_order_id()
                    .unwrap_or_else(|| order.outbound_client_order_id())
                    .to_string(),
            ),
        }
    }
}

/// Order state as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// Exchange order id.
    pub exchange_order_id: String,
    /// Client order id.
    pub client_order_id: Option<String>,
    /// Exchange symbol.
    pub instrument: String,
    /// Side.
    pub side: OrderSide,
    /// Type, when recognised.
    pub order_type: Option<OrderType>,
    /// Original quantity.
    pub quantity: Decimal,
    /// Executed quantity.
    pub executed_quantity: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Raw exchange status code.
    pub raw_status: String,
    /// Mapped status, if the code has a local equivalent.
    pub status: Option<OrderStatus>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A trade of the account as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeTrade {
    /// Trade id.
    pub trade_id: String,
    /// Exchange order id.
    pub exchange_order_id: String,
    /// Exchange symbol.
    pub instrument: String,
    /// Side of the account's order.
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

impl ExchangeTrade {
    /// Convert into an ingestion report.
    #[must_use]
    pub fn into_report(self, exchange_name: &str) -> ExecutionReport {
        ExecutionReport {
            exchange_name: exchange_name.to_string(),
            instrument: self.instrument,
            trade_id: self.trade_id,
            exchange_order_id: Some(self.exchange_order_id),
            client_order_id: None,
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            fee_asset: self.fee_asset,
            fee_amount: self.fee_amount,
            reported_status: None,
            executed_at: self.executed_at,
        }
    }
}

/// Exchange port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Request weight or order rate exceeded.
    #[error("Rate limited by exchange: {message}")]
    RateLimited {
        /// Server retry hint.
        retry_after: Option<Duration>,
        /// Error details.
        message: String,
    },

    /// Exchange refused the request (bad parameters, insufficient funds).
    #[error("Rejected by exchange ({code:?}): {message}")]
    Rejected {
        /// Exchange error code.
        code: Option<i64>,
        /// Error details.
        message: String,
    },

    /// Order unknown to the exchange.
    #[error("Order not found on exchange: {message}")]
    NotFound {
        /// Error details.
        message: String,
    },

    /// Credentials or signature refused.
    #[error("Exchange authentication failed: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// Network failure or timeout.
    #[error("Exchange transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("Exchange response decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Any other non-success response.
    #[error("Exchange API error (HTTP {status}, code {code:?}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Exchange error code.
        code: Option<i64>,
        /// Error details.
        message: String,
    },
}

impl ExchangeError {
    /// Whether the retry executor should retry this error.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Server retry hint, when rate limited.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable code recorded in connector health.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Rejected { .. } => "REJECTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::Transport { .. } => "TRANSPORT",
            Self::Decode { .. } => "DECODE",
            Self::Api { .. } => "API",
        }
    }
}

/// Port for exchange interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Place an order; returns the exchange's view of it.
    async fn place_order(&self, request: &PlaceOrderRequest)
    -> Result<ExchangeOrder, ExchangeError>;

    /// Cancel an order.
    async fn cancel_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError>;

    /// Query one order.
    async fn query_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError>;

    /// All open orders of the account.
    async fn open_orders(&self) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    /// Account trades on `instrument` since `since`.
    async fn recent_trades(
        &self,
        instrument: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExchangeTrade>, ExchangeError>;
}
