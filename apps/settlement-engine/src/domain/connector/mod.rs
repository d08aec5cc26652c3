//! Connector Bounded Context
//!
//! Health of each exchange connector and the queue of reconciliation
//! replays.

mod health;
mod replay;
mod repository;

pub use health::{ConnectorHealthState, ConnectorStatus, WebsocketState};
pub use replay::{
    ConnectorReplayRequest, ReplayEnqueueOutcome, ReplayStatus, ReplayTrigger,
};
pub use repository::ConnectorStateRepository;
