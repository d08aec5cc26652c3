//! Binance API request/response types.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::error::BinanceError;
use crate::application::ports::{ExchangeOrder, ExchangeTrade};
use crate::domain::order_lifecycle::{OrderSide, OrderStatus, OrderType};

/// Error body returned with non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceErrorResponse {
    /// Binance error code.
    pub code: i64,
    /// Error message.
    pub msg: String,
}

/// Order as returned by place, cancel, query and open-orders calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    /// Symbol.
    pub symbol: String,
    /// Exchange order id.
    pub order_id: i64,
    /// Client order id (for cancels, the cancel request's own id).
    pub client_order_id: String,
    /// Client order id of the canceled order.
    #[serde(default)]
    pub orig_client_order_id: Option<String>,
    /// Limit price; zero for market orders.
    #[serde(default)]
    pub price: Decimal,
    /// Original quantity.
    pub orig_qty: Decimal,
    /// Executed quantity.
    pub executed_qty: Decimal,
    /// Order status code.
    pub status: String,
    /// Order type code.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Side code.
    pub side: String,
    /// Creation time (place responses).
    #[serde(default)]
    pub transact_time: Option<i64>,
    /// Last update time (query responses).
    #[serde(default)]
    pub update_time: Option<i64>,
}

impl BinanceOrderResponse {
    /// Convert to the port type.
    pub fn into_exchange_order(self) -> Result<ExchangeOrder, BinanceError> {
        let side = OrderSide::from_exchange(&self.side)
            .ok_or_else(|| BinanceError::JsonParse(format!("unknown side {}", self.side)))?;
        let updated_at = self
            .update_time
            .or(self.transact_time)
            .and_then(from_millis)
            .unwrap_or_else(Utc::now);
        Ok(ExchangeOrder {
            exchange_order_id: self.order_id.to_string(),
            client_order_id: Some(self.orig_client_order_id.unwrap_or(self.client_order_id)),
            instrument: self.symbol,
            side,
            order_type: self.order_type.parse::<OrderType>().ok(),
            quantity: self.orig_qty,
            executed_quantity: self.executed_qty,
            price: (!self.price.is_zero()).then_some(self.price),
            status: OrderStatus::from_exchange(&self.status),
            raw_status: self.status,
            updated_at,
        })
    }
}

/// Account trade from `myTrades`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTradeResponse {
    /// Symbol.
    pub symbol: String,
    /// Trade id.
    pub id: i64,
    /// Exchange order id.
    pub order_id: i64,
    /// Price.
    pub price: Decimal,
    /// Base quantity.
    pub qty: Decimal,
    /// Fee amount.
    pub commission: Decimal,
    /// Fee asset.
    pub commission_asset: Option<String>,
    /// Trade time in epoch milliseconds.
    pub time: i64,
    /// True when the account was the buyer.
    pub is_buyer: bool,
}

impl BinanceTradeResponse {
    /// Convert to the port type.
    pub fn into_exchange_trade(self) -> Result<ExchangeTrade, BinanceError> {
        let executed_at = from_millis(self.time)
            .ok_or_else(|| BinanceError::JsonParse(format!("bad trade time {}", self.time)))?;
        Ok(ExchangeTrade {
            trade_id: self.id.to_string(),
            exchange_order_id: self.order_id.to_string(),
            instrument: self.symbol,
            side: if self.is_buyer {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            quantity: self.qty,
            price: self.price,
            fee_asset: self.commission_asset.filter(|asset| !asset.is_empty()),
            fee_amount: self.commission,
            executed_at,
        })
    }
}

/// Response to a listen key request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyResponse {
    /// Key naming the user data stream.
    pub listen_key: String,
}

/// Epoch milliseconds to UTC.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
