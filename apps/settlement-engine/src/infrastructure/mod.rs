//! Infrastructure Layer
//!
//! Driven adapters binding the application ports to Postgres, Redis, the
//! Binance REST and WebSocket APIs, and the axum operations surface.

pub mod exchange;
pub mod http;
pub mod instruments;
pub mod messaging;
pub mod persistence;
pub mod websocket;
