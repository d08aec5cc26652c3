//! Domain Layer
//!
//! Pure business logic: aggregates, value objects, repository traits and
//! domain services. No I/O.

pub mod connector;
pub mod execution;
pub mod ledger;
pub mod order_lifecycle;
pub mod outbox;
pub mod shared;
pub mod wallet;
