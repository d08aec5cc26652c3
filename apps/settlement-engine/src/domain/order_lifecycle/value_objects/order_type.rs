//! Order type.

code_enum! {
    /// Supported spot order types.
    pub enum OrderType("order_type") {
        /// Execute at the best available price.
        Market => "MARKET",
        /// Execute at the limit price or better.
        Limit => "LIMIT",
    }
}

impl OrderType {
    /// Returns true if a limit price must accompany the order.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit)
    }
}
