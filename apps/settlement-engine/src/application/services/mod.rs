//! Application Services
//!
//! Stateful coordinators over the ports: the transactional services that
//! mutate orders, wallets and the ledger, and the background loops that
//! keep them in step with the exchange and the broker.

mod catch_up_poller;
mod connector_health;
mod execution_ingestion;
mod order_lifecycle;
mod order_submission_worker;
mod outbox_dispatcher;
mod outbox_writer;
mod replay_worker;
mod retry_executor;
mod stream_supervisor;
mod wallet_settlement;

pub use catch_up_poller::{CatchUpPoller, CatchUpPollerConfig, CycleReport};
pub use connector_health::ConnectorHealthHandle;
pub use execution_ingestion::ExecutionIngestionService;
pub use order_lifecycle::OrderLifecycleService;
pub use order_submission_worker::{
    OrderSubmissionWorker, OrderSubmissionWorkerConfig, SubmissionReport,
};
pub use outbox_dispatcher::{DispatchReport, OutboxDispatcher, OutboxDispatcherConfig};
pub use outbox_writer::OutboxWriter;
pub use replay_worker::ReplayWorker;
pub use retry_executor::{ExchangeRetryPolicy, ExponentialBackoffCalculator, RateLimitRetryExecutor};
pub use stream_supervisor::{
    ReconnectBackoff, ReconnectPolicy, StreamSupervisor, StreamSupervisorConfig,
};
pub use wallet_settlement::WalletSettlement;
