//! User data stream frames.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Envelope: the event name in `e`, the body alongside it.
///
/// Frames delivered through a WebSocket API subscription wrap the same
/// body in `{"subscriptionId": .., "event": {..}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum UserDataFrame {
    /// Order update, with or without a fill.
    #[serde(rename = "executionReport")]
    ExecutionReport(Box<ExecutionReportFrame>),
    /// Balance snapshot after an account change.
    #[serde(rename = "outboundAccountPosition")]
    AccountPosition,
    /// Deposit, withdrawal or transfer.
    #[serde(rename = "balanceUpdate")]
    BalanceUpdate,
    /// OCO list status.
    #[serde(rename = "listStatus")]
    ListStatus,
    /// Listen key expired; the session is dead.
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired,
    /// Anything else.
    #[serde(other)]
    Other,
}

/// `executionReport` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReportFrame {
    /// Event time.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Client order id; for cancels, the cancel request's own id.
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Client order id of the canceled order, empty otherwise.
    #[serde(rename = "C", default)]
    pub orig_client_order_id: Option<String>,
    /// Side.
    #[serde(rename = "S")]
    pub side: String,
    /// Order type.
    #[serde(rename = "o")]
    pub order_type: String,
    /// Execution type: NEW, CANCELED, REJECTED, TRADE, EXPIRED.
    #[serde(rename = "x")]
    pub execution_type: String,
    /// Current order status.
    #[serde(rename = "X")]
    pub order_status: String,
    /// Reject reason, `NONE` when not rejected.
    #[serde(rename = "r", default)]
    pub reject_reason: Option<String>,
    /// Exchange order id.
    #[serde(rename = "i")]
    pub order_id: i64,
    /// Last executed quantity.
    #[serde(rename = "l")]
    pub last_quantity: Decimal,
    /// Cumulative filled quantity.
    #[serde(rename = "z")]
    pub cumulative_quantity: Decimal,
    /// Last executed price.
    #[serde(rename = "L")]
    pub last_price: Decimal,
    /// Commission amount.
    #[serde(rename = "n", default)]
    pub commission: Option<Decimal>,
    /// Commission asset.
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
    /// Transaction time.
    #[serde(rename = "T")]
    pub transaction_time: i64,
    /// Trade id, `-1` when no fill.
    #[serde(rename = "t")]
    pub trade_id: i64,
}

impl ExecutionReportFrame {
    /// Id of the order this frame is about.
    #[must_use]
    pub fn order_client_id(&self) -> &str {
        match self.orig_client_order_id.as_deref() {
            Some(orig) if !orig.is_empty() => orig,
            _ => &self.client_order_id,
        }
    }

    /// True for fills.
    #[must_use]
    pub fn is_trade(&self) -> bool {
        self.execution_type == "TRADE"
    }
}
