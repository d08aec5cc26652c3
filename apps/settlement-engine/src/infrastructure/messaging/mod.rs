//! Message broker adapters.
//!
//! Redis Streams in production; an in-process broker for tests and local
//! runs without Redis.

mod in_memory;
mod redis_streams;

pub use in_memory::{InMemoryBroker, InMemoryConsumer};
pub use redis_streams::{RedisStreamsConsumer, RedisStreamsPublisher};
