//! Shared Domain Types
//!
//! Value objects and errors shared across bounded contexts.

pub mod errors;
pub mod value_objects;

pub use errors::{ParseCodeError, RepositoryError};
pub use value_objects::{
    AccountId, AssetPair, DEFAULT_QUOTE_ASSETS, ExecutionId, LedgerEntryId, LedgerTransactionId,
    OrderEventId, OrderId, OutboxEventId, ReplayRequestId, ReservationId,
};
