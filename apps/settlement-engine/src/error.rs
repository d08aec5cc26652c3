//! Crate error and stable reason codes.

use thiserror::Error;

use crate::application::ports::{ExchangeError, PublishError};
use crate::domain::ledger::LedgerError;
use crate::domain::order_lifecycle::OrderError;
use crate::domain::outbox::OutboxError;
use crate::domain::shared::RepositoryError;
use crate::domain::wallet::WalletError;

/// Error returned by application services and use cases.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Order rule violated.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Wallet rule violated.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Ledger did not balance.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Outbox payload rejected.
    #[error(transparent)]
    Outbox(#[from] OutboxError),

    /// Store failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Exchange call failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Broker call failed.
    #[error(transparent)]
    Broker(#[from] PublishError),

    /// Risk gate refused the command.
    #[error("risk check rejected order ({code}): {message}")]
    RiskRejected {
        /// Gate reason code.
        code: String,
        /// Gate message.
        message: String,
    },

    /// Symbol could not be resolved to a base/quote pair.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Connector name not configured.
    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    /// Replay request id not found.
    #[error("replay request not found: {0}")]
    ReplayNotFound(String),
}

/// Stable reason codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed command.
    InvalidParameters,
    /// Illegal status transition.
    InvalidStateTransition,
    /// Order does not exist.
    OrderNotFound,
    /// Order belongs to another account.
    AccountMismatch,
    /// Order already terminal.
    OrderTerminal,
    /// Acknowledgement after the order moved on.
    StaleAcknowledgement,
    /// Conflicting acknowledgement.
    AmbiguousAcknowledgement,
    /// Not enough available funds.
    InsufficientBalance,
    /// Wallet state inconsistent with a fill.
    SettlementInconsistency,
    /// Ledger transaction unbalanced.
    LedgerImbalance,
    /// Outbox payload invalid.
    InvalidEventPayload,
    /// Refused by the risk gate.
    RiskRejected,
    /// Unknown instrument.
    UnknownInstrument,
    /// Unknown connector.
    UnknownConnector,
    /// Referenced resource missing.
    NotFound,
    /// Exchange throttled the call.
    ExchangeRateLimited,
    /// Exchange refused the call.
    ExchangeRejected,
    /// Exchange unreachable or misbehaving.
    ExchangeUnavailable,
    /// Broker unreachable.
    BrokerUnavailable,
    /// Store failure.
    StorageFailure,
}

impl ErrorCode {
    /// SCREAMING_SNAKE reason code.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidParameters => "INVALID_PARAMETERS",
            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::AccountMismatch => "ACCOUNT_MISMATCH",
            Self::OrderTerminal => "ORDER_TERMINAL",
            Self::StaleAcknowledgement => "STALE_ACKNOWLEDGEMENT",
            Self::AmbiguousAcknowledgement => "AMBIGUOUS_ACKNOWLEDGEMENT",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::SettlementInconsistency => "SETTLEMENT_INCONSISTENCY",
            Self::LedgerImbalance => "LEDGER_IMBALANCE",
            Self::InvalidEventPayload => "INVALID_EVENT_PAYLOAD",
            Self::RiskRejected => "RISK_REJECTED",
            Self::UnknownInstrument => "UNKNOWN_INSTRUMENT",
            Self::UnknownConnector => "UNKNOWN_CONNECTOR",
            Self::NotFound => "NOT_FOUND",
            Self::ExchangeRateLimited => "EXCHANGE_RATE_LIMITED",
            Self::ExchangeRejected => "EXCHANGE_REJECTED",
            Self::ExchangeUnavailable => "EXCHANGE_UNAVAILABLE",
            Self::BrokerUnavailable => "BROKER_UNAVAILABLE",
            Self::StorageFailure => "STORAGE_FAILURE",
        }
    }

    /// HTTP status for the operations surface.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidParameters
            | Self::UnknownInstrument
            | Self::UnknownConnector
            | Self::InvalidEventPayload => 400,
            Self::AccountMismatch => 403,
            Self::OrderNotFound | Self::NotFound => 404,
            Self::InvalidStateTransition
            | Self::OrderTerminal
            | Self::StaleAcknowledgement
            | Self::AmbiguousAcknowledgement => 409,
            Self::InsufficientBalance | Self::RiskRejected | Self::ExchangeRejected => 422,
            Self::ExchangeRateLimited => 429,
            Self::ExchangeUnavailable | Self::BrokerUnavailable => 503,
            Self::SettlementInconsistency | Self::LedgerImbalance | Self::StorageFailure => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

impl SettlementError {
    /// Reason code of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Order(err) => match err {
                OrderError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
                OrderError::InvalidParameters { .. } => ErrorCode::InvalidParameters,
                OrderError::NotFound { .. } => ErrorCode::OrderNotFound,
                OrderError::AccountMismatch { .. } => ErrorCode::AccountMismatch,
                OrderError::AlreadyTerminal { .. } => ErrorCode::OrderTerminal,
                OrderError::StaleAcknowledgement { .. } => ErrorCode::StaleAcknowledgement,
                OrderError::AmbiguousAcknowledgement { .. } => {
                    ErrorCode::AmbiguousAcknowledgement
                }
            },
            Self::Wallet(err) => match err {
                WalletError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
                WalletError::InvalidAmount { .. } => ErrorCode::InvalidParameters,
                WalletError::SettlementShortfall { .. }
                | WalletError::ReservedBalanceMismatch { .. }
                | WalletError::ReservationInactive { .. } => ErrorCode::SettlementInconsistency,
            },
            Self::Ledger(_) => ErrorCode::LedgerImbalance,
            Self::Outbox(OutboxError::InvalidPayload { .. }) => ErrorCode::InvalidEventPayload,
            Self::Outbox(OutboxError::Serialization(_)) | Self::Repository(_) => {
                ErrorCode::StorageFailure
            }
            Self::Exchange(err) => match err {
                ExchangeError::RateLimited { .. } => ErrorCode::ExchangeRateLimited,
                ExchangeError::Rejected { .. } => ErrorCode::ExchangeRejected,
                ExchangeError::NotFound { .. } => ErrorCode::NotFound,
                ExchangeError::Authentication { .. }
                | ExchangeError::Transport { .. }
                | ExchangeError::Decode { .. }
                | ExchangeError::Api { .. } => ErrorCode::ExchangeUnavailable,
            },
            Self::Broker(_) => ErrorCode::BrokerUnavailable,
            Self::RiskRejected { .. } => ErrorCode::RiskRejected,
            Self::UnknownInstrument(_) => ErrorCode::UnknownInstrument,
            Self::UnknownConnector(_) => ErrorCode::UnknownConnector,
            Self::ReplayNotFound(_) => ErrorCode::NotFound,
        }
    }
}

/// Result alias for application operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_balance_has_stable_code() {
        let err = SettlementError::from(WalletError::InsufficientBalance {
            account_id: "a-1".to_string(),
            asset: "USDT".to_string(),
            requested: dec!(10),
            available: dec!(1),
        });
        assert_eq!(err.code().reason(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.code().http_status(), 422);
    }

    #[test]
    fn unknown_connector_is_bad_request() {
        let err = SettlementError::UnknownConnector("kraken".to_string());
        assert_eq!(err.code().http_status(), 400);
    }

    #[test]
    fn shortfall_is_an_internal_inconsistency() {
        let err = SettlementError::from(WalletError::SettlementShortfall {
            account_id: "a-1".to_string(),
            asset: "USDT".to_string(),
            shortfall: dec!(1),
        });
        assert_eq!(err.code(), ErrorCode::SettlementInconsistency);
        assert_eq!(err.code().http_status(), 500);
    }
}
