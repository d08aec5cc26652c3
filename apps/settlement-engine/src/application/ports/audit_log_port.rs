//! Audit Log Port (Driven Port)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::shared::{AccountId, OrderId};

/// One audited action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Action name, e.g. `ORDER_PLACED`.
    pub action: &'static str,
    /// Acting account.
    pub account_id: AccountId,
    /// Order concerned.
    pub order_id: Option<OrderId>,
    /// Structured details.
    pub details: serde_json::Value,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Port for audit-log writing.
#[async_trait]
pub trait AuditLogPort: Send + Sync {
    /// Record an action. Failures are the sink's concern.
    async fn record(&self, record: AuditRecord);
}

/// Audit sink that writes structured events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLogPort for TracingAuditLog {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            action = record.action,
            account_id = %record.account_id,
            order_id = record.order_id.as_ref().map(|id| id.as_str()),
            details = %record.details,
            at = %record.at,
            "audit"
        );
    }
}
