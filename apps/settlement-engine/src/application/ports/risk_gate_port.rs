//! Risk Gate Port (Driven Port)
//!
//! Per-account risk and limit checks consulted before order creation.

use async_trait::async_trait;

use crate::domain::order_lifecycle::CreateOrderCommand;

/// Outcome of a risk check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    /// Order may be created.
    Approved,
    /// Order must not be created.
    Rejected {
        /// Stable reason code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Port for the external risk gate.
#[async_trait]
pub trait RiskGatePort: Send + Sync {
    /// Check a command.
    async fn validate(&self, command: &CreateOrderCommand) -> RiskDecision;
}

/// Gate that approves everything, for deployments without a risk service.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllRiskGate;

#[async_trait]
impl RiskGatePort for AllowAllRiskGate {
    async fn validate(&self, _command: &CreateOrderCommand) -> RiskDecision {
        RiskDecision::Approved
    }
}
