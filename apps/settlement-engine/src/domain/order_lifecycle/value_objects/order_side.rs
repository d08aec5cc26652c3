//! Order side (buy or sell).

code_enum! {
    /// Order side.
    pub enum OrderSide("order_side") {
        /// Buy base, pay quote.
        Buy => "BUY",
        /// Sell base, receive quote.
        Sell => "SELL",
    }
}

impl OrderSide {
    /// Parse an exchange side string case-insensitively.
    #[must_use]
    pub fn from_exchange(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}
