//! In-process broker with consumer-group semantics.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::application::ports::{
    ConsumedMessage, MessageConsumerPort, MessagePublisherPort, PublishError,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    key: String,
    payload: serde_json::Value,
}

#[derive(Debug, Default)]
struct GroupCursor {
    /// Index of the next never-delivered message.
    next: usize,
    /// Delivered, unacknowledged message ids.
    pending: BTreeSet<u64>,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_id: u64,
    topics: HashMap<String, Vec<StoredMessage>>,
    groups: HashMap<(String, String), GroupCursor>,
    failing: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    published: Notify,
}

/// Broker keeping every topic in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.shared.state.lock().failing = failing;
    }

    /// Everything published to `topic`, in order.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<ConsumedMessage> {
        self.shared
            .state
            .lock()
            .topics
            .get(topic)
            .map(|messages| messages.iter().map(to_consumed).collect())
            .unwrap_or_default()
    }

    /// Consumer-group member on `topic`.
    #[must_use]
    pub fn consumer(&self, topic: impl Into<String>, group: impl Into<String>) -> InMemoryConsumer {
        InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            topic: topic.into(),
            group: group.into(),
        }
    }
}

fn to_consumed(message: &StoredMessage) -> ConsumedMessage {
    ConsumedMessage {
        delivery_id: message.id.to_string(),
        key: message.key.clone(),
        payload: message.payload.clone(),
    }
}

#[async_trait]
impl MessagePublisherPort for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        {
            let mut state = self.shared.state.lock();
            if state.failing {
                return Err(PublishError::Connection {
                    message: "broker unavailable".to_string(),
                });
            }
            state.next_id += 1;
            let id = state.next_id;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(StoredMessage {
                    id,
                    key: key.to_string(),
                    payload: payload.clone(),
                });
        }
        self.shared.published.notify_waiters();
        Ok(())
    }
}

/// Consumer bound to one topic and group. Unacknowledged deliveries are
/// handed out again on the next receive.
#[derive(Debug, Clone)]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    topic: String,
    group: String,
}

impl InMemoryConsumer {
    fn take(&self, max: usize) -> Vec<ConsumedMessage> {
        let mut state = self.shared.state.lock();
        let BrokerState { topics, groups, .. } = &mut *state;
        let messages = topics.get(&self.topic).map(Vec::as_slice).unwrap_or_default();
        let cursor = groups
            .entry((self.topic.clone(), self.group.clone()))
            .or_default();

        if !cursor.pending.is_empty() {
            return messages
                .iter()
                .filter(|m| cursor.pending.contains(&m.id))
                .take(max)
                .map(to_consumed)
                .collect();
        }

        let fresh: Vec<&StoredMessage> = messages
            .iter()
            .skip(cursor.next)
            .take(max)
            .collect();
        cursor.next += fresh.len();
        cursor.pending.extend(fresh.iter().map(|m| m.id));
        fresh.into_iter().map(to_consumed).collect()
    }
}

#[async_trait]
impl MessageConsumerPort for InMemoryConsumer {
    async fn receive(
        &self,
        max: usize,
        block: Duration,
    ) -> Result<Vec<ConsumedMessage>, PublishError> {
        let notified = self.shared.published.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let messages = self.take(max);
        if !messages.is_empty() || block.is_zero() {
            return Ok(messages);
        }
        let _ = tokio::time::timeout(block, notified).await;
        Ok(self.take(max))
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), PublishError> {
        let id = delivery_id
            .parse::<u64>()
            .map_err(|_| PublishError::Malformed {
                message: format!("unknown delivery id {delivery_id}"),
            })?;
        let mut state = self.shared.state.lock();
        if let Some(cursor) = state
            .groups
            .get_mut(&(self.topic.clone(), self.group.clone()))
        {
            cursor.pending.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unacked_messages_are_redelivered() {
        let broker = InMemoryBroker::new();
        broker.publish("t", "k1", &json!({"n": 1})).await.unwrap();
        broker.publish("t", "k2", &json!({"n": 2})).await.unwrap();
        let consumer = broker.consumer("t", "g");

        let first = consumer.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 2);
        consumer.ack(&first[0].delivery_id).await.unwrap();

        let again = consumer.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].key, "k2");

        consumer.ack(&again[0].delivery_id).await.unwrap();
        assert!(consumer.receive(10, Duration::ZERO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn groups_read_independently() {
        let broker = InMemoryBroker::new();
        broker.publish("t", "k", &json!({})).await.unwrap();
        assert_eq!(broker.consumer("t", "a").receive(10, Duration::ZERO).await.unwrap().len(), 1);
        assert_eq!(broker.consumer("t", "b").receive(10, Duration::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receive_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer("t", "g");
        let publisher = broker.clone();
        let handle = tokio::spawn(async move {
            consumer.receive(10, Duration::from_secs(5)).await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish("t", "k", &json!({})).await.unwrap();
        assert_eq!(handle.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_broker_refuses_publish() {
        let broker = InMemoryBroker::new();
        broker.set_failing(true);
        assert!(broker.publish("t", "k", &json!({})).await.is_err());
        assert!(broker.messages("t").is_empty());
    }
}
