//! Wallet errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while reserving, releasing or settling funds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// Available balance does not cover the requested reservation.
    #[error("insufficient {asset} balance for account {account_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Account.
        account_id: String,
        /// Asset.
        asset: String,
        /// Amount asked for.
        requested: Decimal,
        /// Amount available.
        available: Decimal,
    },

    /// A fill debit exceeded reservation plus available balance.
    #[error("settlement shortfall of {shortfall} {asset} for account {account_id}")]
    SettlementShortfall {
        /// Account.
        account_id: String,
        /// Asset.
        asset: String,
        /// Amount that could not be covered.
        shortfall: Decimal,
    },

    /// Reserved balance is lower than the reservation being drawn down.
    #[error("reserved {asset} balance for account {account_id} is below {required}")]
    ReservedBalanceMismatch {
        /// Account.
        account_id: String,
        /// Asset.
        asset: String,
        /// Amount the reservation expected to be reserved.
        required: Decimal,
    },

    /// Amount was zero or negative where a positive value is required.
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// Offending amount.
        amount: Decimal,
        /// Explanation.
        reason: &'static str,
    },

    /// The reservation is no longer active.
    #[error("reservation {reservation_id} is {status}")]
    ReservationInactive {
        /// Reservation id.
        reservation_id: String,
        /// Current status code.
        status: String,
    },
}
