//! Binance Spot Exchange Adapter
//!
//! Implementation of `ExchangePort` and `ExecutionStreamPort` for the
//! Binance spot REST API and user data stream:
//! - HMAC-SHA256 signed requests
//! - Rate-limit classification with `Retry-After` hints
//! - Listen-key managed WebSocket sessions

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;
mod signing;
mod user_stream;

pub use adapter::BinanceExchangeAdapter;
pub use config::{BinanceConfig, BinanceEnvironment};
pub use error::BinanceError;
pub use http_client::BinanceHttpClient;
pub use signing::RequestSigner;
pub use user_stream::{BinanceStreamSession, BinanceUserStream};
