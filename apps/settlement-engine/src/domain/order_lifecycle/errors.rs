//! Order lifecycle errors.

use std::fmt;

use super::value_objects::OrderStatus;

/// Errors raised by the order aggregate and its state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// No legal transition exists for the requested change.
    InvalidStateTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status, if one could be derived.
        to: Option<OrderStatus>,
        /// Reason for failure.
        reason: String,
    },

    /// Command parameters were malformed.
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Order not found.
    NotFound {
        /// Order ID.
        order_id: String,
    },

    /// The requesting account does not own the order.
    AccountMismatch {
        /// Order ID.
        order_id: String,
    },

    /// The order is already terminal.
    AlreadyTerminal {
        /// Order ID.
        order_id: String,
        /// Terminal status.
        status: OrderStatus,
    },

    /// Acknowledgement arrived for an order that has moved past `NEW`.
    StaleAcknowledgement {
        /// Order ID.
        order_id: String,
        /// Current status.
        status: OrderStatus,
    },

    /// A second acknowledgement carried different exchange identifiers.
    AmbiguousAcknowledgement {
        /// Order ID.
        order_id: String,
        /// Exchange order id already recorded.
        recorded: String,
        /// Exchange order id in the new acknowledgement.
        received: String,
    },
}

impl OrderError {
    /// Shorthand for a parameter validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition {
                from,
                to: Some(to),
                reason,
            } => {
                write!(f, "Invalid order state transition: {from} -> {to}: {reason}")
            }
            Self::InvalidStateTransition {
                from,
                to: None,
                reason,
            } => {
                write!(f, "Invalid order state transition from {from}: {reason}")
            }
            Self::InvalidParameters { field, message } => {
                write!(f, "Invalid order parameter '{field}': {message}")
            }
            Self::NotFound { order_id } => {
                write!(f, "Order not found: {order_id}")
            }
            Self::AccountMismatch { order_id } => {
                write!(f, "Order {order_id} does not belong to the requesting account")
            }
            Self::AlreadyTerminal { order_id, status } => {
                write!(f, "Order {order_id} is already {status}")
            }
            Self::StaleAcknowledgement { order_id, status } => {
                write!(f, "Cannot acknowledge order {order_id} in status {status}")
            }
            Self::AmbiguousAcknowledgement {
                order_id,
                recorded,
                received,
            } => {
                write!(
                    f,
                    "Order {order_id} already acknowledged as {recorded}, refusing {received}"
                )
            }
        }
    }
}

impl std::error::Error for OrderError {}
