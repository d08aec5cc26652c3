//! Ledger Bounded Context
//!
//! Double-entry bookkeeping for fills. Each economic leg is booked against
//! the owning account and mirrored against the exchange clearing account.

mod entry;
mod errors;
mod repository;

pub use entry::{
    Direction, LedgerEntry, LedgerTransaction, LedgerTransactionType, ReferenceType,
    clearing_account,
};
pub use errors::LedgerError;
pub use repository::LedgerRepository;
