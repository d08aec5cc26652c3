//! Order status in the settlement lifecycle.

code_enum! {
    /// Lifecycle status of an order.
    ///
    /// `NEW` is local only; `ACK` means the exchange accepted the order.
    /// `FILLED`, `CANCELED` and `REJECTED` are terminal.
    pub enum OrderStatus("order_status") {
        /// Persisted locally, not yet acknowledged by the exchange.
        New => "NEW",
        /// Accepted by the exchange.
        Acknowledged => "ACK",
        /// Some quantity filled, remainder working.
        PartiallyFilled => "PARTIALLY_FILLED",
        /// Entire quantity filled.
        Filled => "FILLED",
        /// Canceled before completing.
        Canceled => "CANCELED",
        /// Refused by the exchange.
        Rejected => "REJECTED",
    }
}

impl OrderStatus {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Returns true if the order still holds funds or can receive fills.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Map an exchange-reported status string to a lifecycle status.
    ///
    /// Covers the Binance spot vocabulary plus this engine's own codes.
    /// Unknown or transitional codes (`PENDING_CANCEL`) map to `None`.
    #[must_use]
    pub fn from_exchange(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "NEW" | "ACK" | "ACCEPTED" => Some(Self::Acknowledged),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" | "CANCELLED" | "EXPIRED" | "EXPIRED_IN_MATCH" => Some(Self::Canceled),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}
