//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.

mod asset_pair;
mod identifiers;

pub use asset_pair::{AssetPair, DEFAULT_QUOTE_ASSETS};
pub use identifiers::{
    AccountId, ExecutionId, LedgerEntryId, LedgerTransactionId, OrderEventId, OrderId,
    OutboxEventId, ReplayRequestId, ReservationId,
};
