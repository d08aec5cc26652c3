//! Persistence adapters.
//!
//! [`PgStore`] is the production store; [`InMemoryStore`] backs tests and
//! local runs without a database.

mod in_memory;
mod postgres;

pub use in_memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PersistenceError, PgStore, PgUnitOfWork};
