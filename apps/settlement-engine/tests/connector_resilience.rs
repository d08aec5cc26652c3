//! Connector Resilience Tests
//!
//! Catch-up polling, replay execution and stream supervision against the
//! scripted exchange and a channel-backed stream.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{EXCHANGE, Harness, INSTRUMENT, account, fast_retry, fill, limit_buy, trade};
use settlement_engine::application::ports::{
    ExchangeError, ExchangeOrder, ExecutionStreamPort, StreamError, StreamEvent, StreamSession,
};
use settlement_engine::application::services::{
    CatchUpPoller, CatchUpPollerConfig, ConnectorHealthHandle, ReconnectPolicy, ReplayWorker,
    StreamSupervisor, StreamSupervisorConfig,
};
use settlement_engine::domain::connector::{
    ConnectorReplayRequest, ConnectorStateRepository, ConnectorStatus, ReplayEnqueueOutcome,
    ReplayStatus, ReplayTrigger, WebsocketState,
};
use settlement_engine::domain::order_lifecycle::{Order, OrderStatus};
use settlement_engine::infrastructure::persistence::InMemoryStore;

const DOWN_THRESHOLD: Duration = Duration::from_secs(120);

fn health(h: &Harness) -> ConnectorHealthHandle {
    ConnectorHealthHandle::new(EXCHANGE, h.store.clone(), DOWN_THRESHOLD)
}

fn poller(h: &Harness, health: ConnectorHealthHandle) -> CatchUpPoller<InMemoryStore> {
    CatchUpPoller::new(
        h.exchange_port(),
        fast_retry(),
        Arc::clone(&h.lifecycle),
        Arc::clone(&h.ingestion),
        h.catalog.clone(),
        health,
        CatchUpPollerConfig {
            exchange_name: EXCHANGE.to_string(),
            interval: Duration::from_millis(10),
            trade_lookback: Duration::from_secs(3600),
        },
    )
}

/// The exchange's copy of a local order it holds as `exchange_order_id`.
fn listed(order: &Order, exchange_order_id: &str) -> ExchangeOrder {
    ExchangeOrder {
        exchange_order_id: exchange_order_id.to_string(),
        client_order_id: Some(order.outbound_client_order_id().to_string()),
        instrument: INSTRUMENT.to_string(),
        side: order.side(),
        order_type: Some(order.order_type()),
        quantity: order.quantity(),
        executed_quantity: Decimal::ZERO,
        price: order.limit_price(),
        raw_status: "NEW".to_string(),
        status: Some(OrderStatus::Acknowledged),
        updated_at: Utc::now(),
    }
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Catch-up poller
// =============================================================================

#[tokio::test]
async fn poller_acknowledges_listed_orders_and_ingests_trades() {
    let h = Harness::funded(dec!(5000)).await;
    let order = h
        .lifecycle
        .create(limit_buy(dec!(0.01), dec!(50000)))
        .await
        .unwrap();
    h.exchange.add_open_order(listed(&order, "EX-55"));
    h.exchange.add_trade(trade("EX-55", "T-900", dec!(0.01)));

    let health = health(&h);
    let poller = poller(&h, health.clone());

    let report = poller.run_cycle().await.unwrap();
    assert_eq!(report.open_orders, 1);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.trades, 1);
    assert_eq!(report.inserted, 1);

    let stored = h.store.order(order.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Filled);
    assert_eq!(stored.exchange_order_id(), Some("EX-55"));
    let usdt = h.store.balance(&account(), "USDT").await.unwrap();
    assert_eq!(usdt.available, dec!(4499.5));
    assert_eq!(usdt.reserved, dec!(0));

    let again = poller.run_cycle().await.unwrap();
    assert_eq!(again.acknowledged, 0);
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 1);
    assert_eq!(h.store.executions().await.len(), 1);

    let snapshot = health.snapshot();
    assert_eq!(snapshot.status, ConnectorStatus::Up);
    assert_eq!(snapshot.open_orders_fetched, 1);
    assert_eq!(snapshot.trades_fetched, 1);

    let persisted = h.store.find_health(EXCHANGE).await.unwrap().unwrap();
    assert_eq!(persisted.last_success_at, snapshot.last_success_at);
}

#[tokio::test]
async fn poller_counts_unmapped_trades() {
    let h = Harness::funded(dec!(5000)).await;
    h.exchange.add_trade(trade("EX-unknown", "T-1", dec!(0.01)));

    let report = poller(&h, health(&h)).run_cycle().await.unwrap();
    assert_eq!(report.trades, 1);
    assert_eq!(report.unmapped, 1);
    assert!(h.store.executions().await.is_empty());
}

#[tokio::test]
async fn poller_failure_degrades_health() {
    let h = Harness::funded(dec!(5000)).await;
    let health = health(&h);
    let poller = poller(&h, health.clone());

    poller.run_cycle().await.unwrap();
    assert_eq!(health.snapshot().status, ConnectorStatus::Up);

    h.exchange.fail_open_orders(Some(ExchangeError::Transport {
        message: "connection reset".to_string(),
    }));
    let err = poller.run_cycle().await.unwrap_err();
    assert_eq!(err.code(), "TRANSPORT");

    let snapshot = health.snapshot();
    assert_eq!(snapshot.status, ConnectorStatus::Degraded);
    assert_eq!(snapshot.last_error_code.as_deref(), Some("TRANSPORT"));
}

#[tokio::test]
async fn poller_reports_trades_that_fail_to_apply() {
    // The whole balance is reserved, so the fee cannot be settled.
    let h = Harness::funded(dec!(500)).await;
    let order = h
        .acknowledged_order(limit_buy(dec!(0.01), dec!(50000)), "EX-31")
        .await;
    let health = health(&h);
    let poller = poller(&h, health.clone());

    poller.run_cycle().await.unwrap();
    assert_eq!(health.snapshot().status, ConnectorStatus::Up);
    let first_success = health.snapshot().last_success_at;

    tokio::time::sleep(Duration::from_millis(5)).await;
    h.exchange.add_trade(trade("EX-31", "T-31", dec!(0.01)));
    let report = poller.run_cycle().await.unwrap();
    assert_eq!(report.trades, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());

    let snapshot = health.snapshot();
    assert_eq!(snapshot.status, ConnectorStatus::Degraded);
    assert_eq!(snapshot.last_success_at, first_success);
    assert_eq!(snapshot.last_error_code.as_deref(), Some("FILL_APPLY"));
    assert_eq!(
        h.store.order(order.id()).await.unwrap().status(),
        OrderStatus::Acknowledged
    );
    assert!(h.store.executions().await.is_empty());
}

#[tokio::test]
async fn poller_without_success_is_down() {
    let h = Harness::funded(dec!(5000)).await;
    h.exchange.fail_open_orders(Some(ExchangeError::Authentication {
        message: "Invalid API-key".to_string(),
    }));
    let health = health(&h);

    assert!(poller(&h, health.clone()).run_cycle().await.is_err());
    assert_eq!(health.snapshot().status, ConnectorStatus::Down);
}

// =============================================================================
// Replay worker
// =============================================================================

async fn enqueue(h: &Harness, trigger: ReplayTrigger) -> ConnectorReplayRequest {
    let request = ConnectorReplayRequest::pending(
        EXCHANGE,
        trigger,
        Some("gap after deploy".to_string()),
        Some("ops".to_string()),
        Utc::now(),
    );
    match h
        .store
        .enqueue_replay(request, Duration::from_secs(60))
        .await
        .unwrap()
    {
        ReplayEnqueueOutcome::Enqueued(request) => request,
        ReplayEnqueueOutcome::Deduplicated(request) => panic!("unexpected dedupe of {}", request.id),
    }
}

#[tokio::test]
async fn replay_runs_a_catch_up_cycle() {
    let h = Harness::funded(dec!(5000)).await;
    let order = h
        .acknowledged_order(limit_buy(dec!(0.01), dec!(50000)), "EX-12")
        .await;
    h.exchange.add_trade(trade("EX-12", "T-1", dec!(0.01)));
    let queued = enqueue(&h, ReplayTrigger::Manual).await;

    let worker = ReplayWorker::new(
        h.store.clone(),
        Arc::new(poller(&h, health(&h))),
        Duration::from_millis(10),
    );

    let done = worker.run_once().await.unwrap().unwrap();
    assert_eq!(done.id, queued.id);
    assert_eq!(done.status, ReplayStatus::Succeeded);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert_eq!(
        h.store.order(order.id()).await.unwrap().status(),
        OrderStatus::Filled
    );

    assert!(worker.run_once().await.unwrap().is_none());
}

#[tokio::test]
async fn failed_replay_records_the_error() {
    let h = Harness::funded(dec!(5000)).await;
    h.exchange.fail_open_orders(Some(ExchangeError::Transport {
        message: "timeout".to_string(),
    }));
    enqueue(&h, ReplayTrigger::Recovery).await;

    let worker = ReplayWorker::new(
        h.store.clone(),
        Arc::new(poller(&h, health(&h))),
        Duration::from_millis(10),
    );

    let done = worker.run_once().await.unwrap().unwrap();
    assert_eq!(done.status, ReplayStatus::Failed);
    assert!(done.error.unwrap().contains("timeout"));
}

#[tokio::test]
async fn replay_with_unapplied_trades_fails() {
    let h = Harness::funded(dec!(500)).await;
    h.acknowledged_order(limit_buy(dec!(0.01), dec!(50000)), "EX-32")
        .await;
    h.exchange.add_trade(trade("EX-32", "T-32", dec!(0.01)));
    enqueue(&h, ReplayTrigger::Manual).await;

    let worker = ReplayWorker::new(
        h.store.clone(),
        Arc::new(poller(&h, health(&h))),
        Duration::from_millis(10),
    );

    let done = worker.run_once().await.unwrap().unwrap();
    assert_eq!(done.status, ReplayStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("1 of 1 trades failed to apply"));
}

#[tokio::test]
async fn open_replays_are_deduplicated() {
    let h = Harness::new();
    let first = enqueue(&h, ReplayTrigger::Manual).await;

    let again = ConnectorReplayRequest::pending(
        EXCHANGE,
        ReplayTrigger::Manual,
        None,
        None,
        Utc::now(),
    );
    let outcome = h
        .store
        .enqueue_replay(again, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReplayEnqueueOutcome::Deduplicated(ref existing) if existing.id == first.id
    ));

    let other_trigger = ConnectorReplayRequest::pending(
        EXCHANGE,
        ReplayTrigger::Recovery,
        None,
        None,
        Utc::now(),
    );
    let outcome = h
        .store
        .enqueue_replay(other_trigger, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(matches!(outcome, ReplayEnqueueOutcome::Enqueued(_)));
}

// =============================================================================
// Stream supervisor
// =============================================================================

type Frame = Result<StreamEvent, StreamError>;

struct ChannelSession {
    frames: mpsc::Receiver<Frame>,
}

#[async_trait]
impl StreamSession for ChannelSession {
    async fn next_event(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    async fn close(self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Hands out one scripted session per connect; once they run out, connect
/// attempts hang until the supervisor is cancelled.
struct ChannelStream {
    sessions: Mutex<VecDeque<mpsc::Receiver<Frame>>>,
}

impl ChannelStream {
    fn new(sessions: Vec<mpsc::Receiver<Frame>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
        }
    }
}

#[async_trait]
impl ExecutionStreamPort for ChannelStream {
    type Session = ChannelSession;

    async fn open(&self) -> Result<ChannelSession, StreamError> {
        let next = self.sessions.lock().pop_front();
        match next {
            Some(frames) => Ok(ChannelSession { frames }),
            None => std::future::pending().await,
        }
    }
}

fn supervisor(
    h: &Harness,
    stream: ChannelStream,
    health: ConnectorHealthHandle,
) -> StreamSupervisor<InMemoryStore, ChannelStream> {
    StreamSupervisor::new(
        Arc::new(stream),
        Arc::clone(&h.ingestion),
        h.store.clone(),
        health,
        StreamSupervisorConfig {
            exchange_name: EXCHANGE.to_string(),
            stable_after: Duration::from_secs(60),
            replay_dedupe_window: Duration::from_secs(60),
            reconnect: ReconnectPolicy {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                multiplier: 2.0,
            },
        },
    )
}

#[tokio::test]
async fn stream_fills_are_ingested_and_drops_queue_recovery() {
    let h = Harness::funded(dec!(5000)).await;
    let order = h
        .acknowledged_order(limit_buy(dec!(0.01), dec!(50000)), "EX-77")
        .await;

    let (frames, session) = mpsc::channel(8);
    let health = health(&h);
    let supervisor = supervisor(&h, ChannelStream::new(vec![session]), health.clone());
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move { supervisor.run(token).await });

    frames
        .send(Ok(StreamEvent::Execution(fill(
            "EX-77",
            "T-1",
            dec!(0.01),
            dec!(50000),
            dec!(0),
        ))))
        .await
        .unwrap();
    frames
        .send(Err(StreamError::Decode {
            message: "unexpected field".to_string(),
        }))
        .await
        .unwrap();
    frames.send(Ok(StreamEvent::Ignored)).await.unwrap();
    drop(frames);

    let store = Arc::clone(&h.store);
    wait_for(|| {
        let store = Arc::clone(&store);
        async move { !store.replay_requests().await.is_empty() }
    })
    .await;

    assert_eq!(
        h.store.order(order.id()).await.unwrap().status(),
        OrderStatus::Filled
    );

    let replays = h.store.replay_requests().await;
    assert_eq!(replays.len(), 1);
    assert_eq!(replays[0].trigger, ReplayTrigger::Recovery);
    assert_eq!(replays[0].status, ReplayStatus::Pending);
    assert_eq!(replays[0].requested_by.as_deref(), Some("stream-supervisor"));

    let snapshot = health.snapshot();
    assert_eq!(snapshot.stream_fills_inserted, 1);
    assert_eq!(snapshot.stream_errors, 1);
    assert_eq!(snapshot.last_error_code.as_deref(), Some("STREAM_CLOSED"));

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(health.snapshot().websocket_state, WebsocketState::Down);
}

#[tokio::test]
async fn unmapped_stream_fill_requests_recovery() {
    let h = Harness::funded(dec!(5000)).await;
    let (frames, session) = mpsc::channel(8);
    let health = health(&h);
    let supervisor = supervisor(&h, ChannelStream::new(vec![session]), health.clone());
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move { supervisor.run(token).await });

    frames
        .send(Ok(StreamEvent::Execution(fill(
            "EX-ghost",
            "T-9",
            dec!(0.01),
            dec!(50000),
            dec!(0),
        ))))
        .await
        .unwrap();

    let store = Arc::clone(&h.store);
    wait_for(|| {
        let store = Arc::clone(&store);
        async move { !store.replay_requests().await.is_empty() }
    })
    .await;
    assert_eq!(health.snapshot().stream_fills_unmapped, 1);
    assert_eq!(health.snapshot().websocket_state, WebsocketState::Up);

    let replays = h.store.replay_requests().await;
    assert_eq!(replays.len(), 1);
    assert!(replays[0].reason.as_deref().unwrap().contains("T-9"));

    shutdown.cancel();
    task.await.unwrap();
    drop(frames);
}
