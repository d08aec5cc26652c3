// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::or_fun_call
    )
)]

//! Settlement Engine - Rust Core Library
//!
//! Settlement core for crypto-spot trading: order lifecycle, wallet
//! reservations, double-entry ledger, transactional outbox and exchange
//! connector resilience.
//!
//! # Architecture (Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: aggregates, value objects and repository traits
//!   - `order_lifecycle`: Order aggregate and status state machine
//!   - `execution`: fills, dedupe keys and fill economics
//!   - `wallet`: balances and reservations
//!   - `ledger`: balanced double-entry transactions
//!   - `outbox`: versioned event payloads, relay statuses, retry schedule
//!   - `connector`: health snapshot and replay queue
//!
//! - **Application**: ports, transactional services, background loops and
//!   use cases (place, submit, cancel, replay)
//!
//! - **Infrastructure**: PostgreSQL and in-memory stores, Binance REST and
//!   user-data stream, Redis Streams and in-memory brokers, the axum
//!   operations surface, static instrument catalog
//!
//! Every multi-table mutation runs inside one unit of work; events leave
//! through the outbox only after that unit commits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

#[macro_use]
mod macros;

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Ports, services and use cases.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// YAML configuration.
pub mod config;

/// Logging and metrics initialisation.
pub mod observability;

/// Crate error type and reason codes.
pub mod error;

pub use error::{ErrorCode, SettlementError, SettlementResult};
