//! Outbox Dispatch Tests
//!
//! Outbox rows written by order operations are relayed to the in-memory
//! broker, abandoned leases are reclaimed, poison rows are quarantined and
//! requeued, and the submission worker consumes what was published.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;

use common::{Harness, TOPIC_PREFIX, fast_retry, limit_buy};
use settlement_engine::application::services::{
    OrderSubmissionWorker, OrderSubmissionWorkerConfig, OutboxDispatcher, OutboxDispatcherConfig,
};
use settlement_engine::application::use_cases::SubmitToExchangeUseCase;
use settlement_engine::domain::order_lifecycle::OrderStatus;
use settlement_engine::domain::outbox::{
    EventPayload, EventType, OrderSubmittedV1, OutboxRelayStore, OutboxStatus, RetrySchedule,
    topic_name,
};
use settlement_engine::infrastructure::messaging::InMemoryBroker;
use settlement_engine::infrastructure::persistence::InMemoryStore;

fn dispatcher_config(lease_timeout: Duration, max_attempts: u32) -> OutboxDispatcherConfig {
    OutboxDispatcherConfig {
        poll_interval: Duration::from_millis(10),
        lease_timeout,
        batch_size: 100,
        schedule: RetrySchedule {
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts,
        },
    }
}

fn dispatcher(
    h: &Harness,
    broker: &Arc<InMemoryBroker>,
    config: OutboxDispatcherConfig,
) -> OutboxDispatcher<InMemoryStore, InMemoryBroker> {
    OutboxDispatcher::new(Arc::clone(&h.store), Arc::clone(broker), config)
}

fn submitted_topic() -> String {
    topic_name(
        TOPIC_PREFIX,
        EventType::OrderSubmitted,
        OrderSubmittedV1::SCHEMA_VERSION,
    )
}

#[tokio::test]
async fn publishes_rows_in_order_and_marks_them() {
    let h = Harness::funded(dec!(5000)).await;
    let order = h
        .lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = dispatcher(&h, &broker, dispatcher_config(Duration::from_secs(120), 3));

    let report = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(report.claimed, 2);
    assert_eq!(report.published, 2);
    assert_eq!(report.failed, 0);

    let messages = broker.messages(&submitted_topic());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, order.id().to_string());
    assert_eq!(messages[0].payload["event_type"], "order-submitted");
    assert_eq!(messages[0].payload["payload"]["order_id"], order.id().to_string());

    for event in h.store.outbox_events().await {
        assert_eq!(event.status, OutboxStatus::Published);
        assert!(event.published_at.is_some());
    }

    let idle = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(idle.claimed, 0);
}

#[tokio::test]
async fn stale_leases_are_reclaimed_and_published() {
    let h = Harness::funded(dec!(5000)).await;
    h.lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();

    // A dispatcher that claimed and then died.
    let abandoned = h.store.claim_batch(10, Utc::now()).await.unwrap();
    assert_eq!(abandoned.len(), 2);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = dispatcher(&h, &broker, dispatcher_config(Duration::from_millis(50), 3));
    let report = dispatcher.dispatch_once().await.unwrap();

    assert_eq!(report.reclaimed, 2);
    assert_eq!(report.published, 2);
    assert_eq!(broker.messages(&submitted_topic()).len(), 1);
}

#[tokio::test]
async fn live_leases_are_left_alone() {
    let h = Harness::funded(dec!(5000)).await;
    h.lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();
    h.store.claim_batch(10, Utc::now()).await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let dispatcher = dispatcher(&h, &broker, dispatcher_config(Duration::from_secs(120), 3));
    let report = dispatcher.dispatch_once().await.unwrap();

    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.claimed, 0);
    assert!(broker.messages(&submitted_topic()).is_empty());
}

#[tokio::test]
async fn failing_rows_go_dead_then_requeue() {
    let h = Harness::funded(dec!(5000)).await;
    h.lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    broker.set_failing(true);
    let dispatcher = dispatcher(&h, &broker, dispatcher_config(Duration::from_secs(120), 2));

    let first = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(first.failed, 2);
    for event in h.store.outbox_events().await {
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempt_count, 1);
        assert!(event.last_error.is_some());
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(second.dead, 2);

    let events = h.store.outbox_events().await;
    assert!(events.iter().all(|e| e.status == OutboxStatus::Dead));

    // Dead rows are never claimed again on their own.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(dispatcher.dispatch_once().await.unwrap().claimed, 0);

    broker.set_failing(false);
    let first_id = events[0].id.clone();
    assert_eq!(
        dispatcher
            .requeue_dead(Some(std::slice::from_ref(&first_id)))
            .await
            .unwrap(),
        1
    );
    let report = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(report.published, 1);

    let requeued = h.store.find_outbox_event(&first_id).await.unwrap().unwrap();
    assert_eq!(requeued.status, OutboxStatus::Published);

    assert_eq!(dispatcher.requeue_dead(None).await.unwrap(), 1);
    assert_eq!(dispatcher.dispatch_once().await.unwrap().published, 1);
}

#[tokio::test]
async fn submission_worker_places_published_orders() {
    let h = Harness::funded(dec!(5000)).await;
    let order = h
        .lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();
    let broker = Arc::new(InMemoryBroker::new());
    dispatcher(&h, &broker, dispatcher_config(Duration::from_secs(120), 3))
        .dispatch_once()
        .await
        .unwrap();

    let submit = Arc::new(SubmitToExchangeUseCase::new(
        h.exchange_port(),
        fast_retry(),
        Arc::clone(&h.lifecycle),
    ));
    let consumer = Arc::new(broker.consumer(submitted_topic(), "order-submission"));
    let worker = OrderSubmissionWorker::new(
        consumer,
        submit,
        OrderSubmissionWorkerConfig {
            batch_size: 10,
            block: Duration::from_millis(20),
            failure_backoff: Duration::from_millis(10),
        },
    );

    let report = worker.poll_once().await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.acknowledged, 1);

    let stored = h.store.order(order.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Acknowledged);
    assert!(stored.exchange_order_id().is_some());

    // Acknowledged deliveries are not handed out again.
    let idle = worker.poll_once().await.unwrap();
    assert_eq!(idle.received, 0);
}

#[tokio::test]
async fn malformed_submissions_are_discarded() {
    use settlement_engine::application::ports::MessagePublisherPort;

    let broker = Arc::new(InMemoryBroker::new());
    broker
        .publish(&submitted_topic(), "junk", &serde_json::json!({"not": "an envelope"}))
        .await
        .unwrap();

    let h = Harness::new();
    let submit = Arc::new(SubmitToExchangeUseCase::new(
        h.exchange_port(),
        fast_retry(),
        Arc::clone(&h.lifecycle),
    ));
    let worker = OrderSubmissionWorker::new(
        Arc::new(broker.consumer(submitted_topic(), "order-submission")),
        submit,
        OrderSubmissionWorkerConfig::default(),
    );

    let report = worker.poll_once().await.unwrap();
    assert_eq!(report.malformed, 1);
    assert!(h.exchange.placed().is_empty());
}
