//! Order audit-trail records.
//!
//! One [`OrderEventRecord`] is appended per state-changing operation and is
//! never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::OrderStatus;
use crate::domain::shared::{OrderEventId, OrderId};

code_enum! {
    /// Kind of state change recorded in the audit trail.
    pub enum OrderEventType("order_event_type") {
        /// Order persisted with status `NEW`.
        OrderCreated => "ORDER_CREATED",
        /// Exchange accepted the order.
        OrderAcknowledged => "ORDER_ACKNOWLEDGED",
        /// Order canceled by its account.
        OrderCanceled => "ORDER_CANCELED",
        /// Exchange refused the order.
        OrderRejected => "ORDER_REJECTED",
        /// A fill was applied.
        ExecutionApplied => "EXECUTION_APPLIED",
        /// A non-fill exchange status was applied.
        StatusReconciled => "STATUS_RECONCILED",
    }
}

/// Immutable audit row for one order transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventRecord {
    /// Row identifier.
    pub id: OrderEventId,
    /// Order the event belongs to.
    pub order_id: OrderId,
    /// Kind of change.
    pub event_type: OrderEventType,
    /// Status before the change (`None` on creation).
    pub from_status: Option<OrderStatus>,
    /// Status after the change.
    pub to_status: OrderStatus,
    /// Structured details of the change.
    pub payload: serde_json::Value,
    /// When the change was committed.
    pub created_at: DateTime<Utc>,
}

impl OrderEventRecord {
    /// Build a new audit row with a generated id.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        event_type: OrderEventType,
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderEventId::generate(),
            order_id,
            event_type,
            from_status,
            to_status,
            payload,
            created_at,
        }
    }
}
