//! Application Ports (Driven)
//!
//! Interfaces the application layer uses to reach external systems. One
//! implementation of each is bound at startup.

mod audit_log_port;
mod exchange_port;
mod execution_stream_port;
mod instrument_catalog_port;
mod message_broker_port;
mod risk_gate_port;
mod unit_of_work_port;

pub use audit_log_port::{AuditLogPort, AuditRecord, TracingAuditLog};
#[cfg(test)]
pub use exchange_port::MockExchangePort;
pub use exchange_port::{
    ExchangeError, ExchangeOrder, ExchangePort, ExchangeTrade, OrderLookup, PlaceOrderRequest,
};
pub use execution_stream_port::{ExecutionStreamPort, StreamError, StreamEvent, StreamSession};
pub use instrument_catalog_port::InstrumentCatalogPort;
pub use message_broker_port::{
    ConsumedMessage, MessageConsumerPort, MessagePublisherPort, PublishError,
};
pub use risk_gate_port::{AllowAllRiskGate, RiskDecision, RiskGatePort};
pub use unit_of_work_port::{TransactionManager, UnitOfWork};
