//! Ledger errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while building or checking a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Credits minus debits for an asset is not zero.
    #[error("ledger transaction {transaction_id} unbalanced in {asset}: net {net}")]
    Unbalanced {
        /// Transaction id.
        transaction_id: String,
        /// Asset that does not net to zero.
        asset: String,
        /// Credit minus debit.
        net: Decimal,
    },

    /// An entry amount was not strictly positive.
    #[error("ledger entry amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// A transaction without entries.
    #[error("ledger transaction {0} has no entries")]
    Empty(String),
}
