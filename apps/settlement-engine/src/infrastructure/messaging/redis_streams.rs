//! Redis Streams publisher and consumer-group reader.
//!
//! Each message is one stream entry with two fields: `key` (the partition
//! key) and `payload` (the JSON envelope). Topics map one-to-one to stream
//! keys.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::Mutex;

use crate::application::ports::{
    ConsumedMessage, MessageConsumerPort, MessagePublisherPort, PublishError,
};

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

/// Lazily (re)connected shared connection.
struct Connector {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl Connector {
    fn open(redis_url: &str) -> Result<Self, PublishError> {
        let client = Client::open(redis_url).map_err(connection_error)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, PublishError> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(connection_error)?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Drop the cached connection after a transport failure.
    async fn on_error(&self, err: RedisError) -> PublishError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            *self.connection.lock().await = None;
            return connection_error(err);
        }
        PublishError::Command {
            message: err.to_string(),
        }
    }
}

fn connection_error(err: RedisError) -> PublishError {
    PublishError::Connection {
        message: err.to_string(),
    }
}

/// Publishes outbox events with `XADD`.
pub struct RedisStreamsPublisher {
    connector: Connector,
    max_len: Option<usize>,
}

impl RedisStreamsPublisher {
    /// Create a publisher; the connection opens on first use.
    pub fn new(redis_url: &str) -> Result<Self, PublishError> {
        Ok(Self {
            connector: Connector::open(redis_url)?,
            max_len: None,
        })
    }

    /// Trim streams to roughly `max_len` entries on every append.
    #[must_use]
    pub const fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

#[async_trait]
impl MessagePublisherPort for RedisStreamsPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_string(payload).map_err(|e| PublishError::Malformed {
            message: e.to_string(),
        })?;
        let fields = [(KEY_FIELD, key), (PAYLOAD_FIELD, body.as_str())];
        let mut conn = self.connector.connection().await?;

        let result: Result<String, RedisError> = match self.max_len {
            Some(max_len) => {
                conn.xadd_maxlen(
                    topic,
                    redis::streams::StreamMaxlen::Approx(max_len),
                    "*",
                    &fields,
                )
                .await
            }
            None => conn.xadd(topic, "*", &fields).await,
        };
        match result {
            Ok(entry_id) => {
                tracing::debug!(topic, key, entry_id = %entry_id, "Published to stream");
                Ok(())
            }
            Err(err) => Err(self.connector.on_error(err).await),
        }
    }
}

/// Consumer-group member reading one stream.
///
/// Each receive first re-reads this consumer's pending (delivered but
/// unacknowledged) entries, then blocks for new ones.
pub struct RedisStreamsConsumer {
    connector: Connector,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisStreamsConsumer {
    /// Connect and make sure the group exists.
    pub async fn new(
        redis_url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let this = Self {
            connector: Connector::open(redis_url)?,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        };
        this.ensure_group().await?;
        Ok(this)
    }

    async fn ensure_group(&self) -> Result<(), PublishError> {
        let mut conn = self.connector.connection().await?;
        let created: Result<(), RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(self.connector.on_error(err).await),
        }
    }

    async fn read(
        &self,
        start: &str,
        max: usize,
        block: Option<Duration>,
    ) -> Result<Vec<ConsumedMessage>, PublishError> {
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max);
        if let Some(block) = block {
            options = options.block(usize::try_from(block.as_millis()).unwrap_or(usize::MAX));
        }

        let mut conn = self.connector.connection().await?;
        let reply: Result<Option<StreamReadReply>, RedisError> = conn
            .xread_options(&[self.stream.as_str()], &[start], &options)
            .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => return Err(self.connector.on_error(err).await),
        };

        Ok(reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .map(|entry| self.to_message(&entry))
            .collect())
    }

    fn to_message(&self, entry: &StreamId) -> ConsumedMessage {
        let key = entry.get::<String>(KEY_FIELD).unwrap_or_default();
        let payload = match entry.get::<String>(PAYLOAD_FIELD) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(stream = %self.stream, entry_id = %entry.id, error = %e, "Stream entry is not JSON");
                serde_json::Value::Null
            }),
            None => serde_json::Value::Null,
        };
        ConsumedMessage {
            delivery_id: entry.id.clone(),
            key,
            payload,
        }
    }
}

#[async_trait]
impl MessageConsumerPort for RedisStreamsConsumer {
    async fn receive(
        &self,
        max: usize,
        block: Duration,
    ) -> Result<Vec<ConsumedMessage>, PublishError> {
        let pending = self.read("0", max, None).await?;
        if !pending.is_empty() {
            tracing::debug!(stream = %self.stream, count = pending.len(), "Redelivering pending entries");
            return Ok(pending);
        }
        self.read(">", max, Some(block)).await
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), PublishError> {
        let mut conn = self.connector.connection().await?;
        let acked: Result<i64, RedisError> =
            conn.xack(&self.stream, &self.group, &[delivery_id]).await;
        match acked {
            Ok(_) => Ok(()),
            Err(err) => Err(self.connector.on_error(err).await),
        }
    }
}
