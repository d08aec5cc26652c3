//! Execution Bounded Context
//!
//! Exchange fill reports, the deduplicated execution facts derived from
//! them, and their per-asset economics.

mod economics;
mod entity;
mod repository;

pub use economics::{AssetLeg, FillEconomics, LegKind};
pub use entity::{
    Execution, ExecutionReport, IngestOutcome, InsertOutcome, ReconcileOutcome, StatusReport,
};
pub use repository::ExecutionRepository;
