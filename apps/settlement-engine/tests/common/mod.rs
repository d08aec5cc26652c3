//! Shared fixtures for the integration tests.
//!
//! Wires the services over the in-memory store and provides a scripted
//! exchange double.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use settlement_engine::application::ports::{
    ExchangeError, ExchangeOrder, ExchangePort, ExchangeTrade, OrderLookup, PlaceOrderRequest,
};
use settlement_engine::application::services::{
    ExchangeRetryPolicy, ExecutionIngestionService, OrderLifecycleService, OutboxWriter,
    RateLimitRetryExecutor,
};
use settlement_engine::domain::execution::ExecutionReport;
use settlement_engine::domain::order_lifecycle::{
    CreateOrderCommand, Order, OrderSide, OrderStatus, OrderType,
};
use settlement_engine::domain::shared::AccountId;
use settlement_engine::infrastructure::instruments::{
    InstrumentDefinition, StaticInstrumentCatalog,
};
use settlement_engine::infrastructure::persistence::InMemoryStore;

pub const EXCHANGE: &str = "binance";
pub const INSTRUMENT: &str = "BTCUSDT";
pub const TOPIC_PREFIX: &str = "settlement";

// =============================================================================
// Scripted exchange
// =============================================================================

#[derive(Default)]
struct ExchangeState {
    next_id: u64,
    open_orders: Vec<ExchangeOrder>,
    trades: Vec<ExchangeTrade>,
    place_errors: VecDeque<ExchangeError>,
    placed: Vec<PlaceOrderRequest>,
    canceled: Vec<OrderLookup>,
    open_orders_error: Option<ExchangeError>,
}

/// Exchange double: accepts orders unless an error is scripted, keeps
/// accepted orders open and serves whatever trades a test adds.
#[derive(Default)]
pub struct FakeExchange {
    state: Mutex<ExchangeState>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `place_order` call with `error`.
    pub fn fail_next_place(&self, error: ExchangeError) {
        self.state.lock().place_errors.push_back(error);
    }

    /// Fail every `open_orders` call with `error` until cleared.
    pub fn fail_open_orders(&self, error: Option<ExchangeError>) {
        self.state.lock().open_orders_error = error;
    }

    /// List an order as open without it having been placed through us.
    pub fn add_open_order(&self, order: ExchangeOrder) {
        self.state.lock().open_orders.push(order);
    }

    pub fn add_trade(&self, trade: ExchangeTrade) {
        self.state.lock().trades.push(trade);
    }

    pub fn placed(&self) -> Vec<PlaceOrderRequest> {
        self.state.lock().placed.clone()
    }

    pub fn canceled(&self) -> Vec<OrderLookup> {
        self.state.lock().canceled.clone()
    }

    fn matches(order: &ExchangeOrder, lookup: &OrderLookup) -> bool {
        lookup
            .exchange_order_id
            .as_deref()
            .is_some_and(|id| id == order.exchange_order_id)
            || (lookup.client_order_id.is_some() && lookup.client_order_id == order.client_order_id)
    }
}

#[async_trait]
impl ExchangePort for FakeExchange {
    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<ExchangeOrder, ExchangeError> {
        let mut state = self.state.lock();
        if let Some(error) = state.place_errors.pop_front() {
            return Err(error);
        }
        state.next_id += 1;
        let order = ExchangeOrder {
            exchange_order_id: format!("EX-{}", state.next_id),
            client_order_id: Some(request.client_order_id.clone()),
            instrument: request.instrument.clone(),
            side: request.side,
            order_type: Some(request.order_type),
            quantity: request.quantity,
            executed_quantity: Decimal::ZERO,
            price: request.limit_price,
            raw_status: "NEW".to_string(),
            status: Some(OrderStatus::Acknowledged),
            updated_at: Utc::now(),
        };
        state.placed.push(request.clone());
        state.open_orders.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError> {
        let mut state = self.state.lock();
        state.canceled.push(lookup.clone());
        let Some(index) = state.open_orders.iter().position(|o| Self::matches(o, lookup)) else {
            return Err(ExchangeError::NotFound {
                message: "Unknown order sent.".to_string(),
            });
        };
        let mut order = state.open_orders.remove(index);
        order.raw_status = "CANCELED".to_string();
        order.status = Some(OrderStatus::Canceled);
        Ok(order)
    }

    async fn query_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError> {
        self.state
            .lock()
            .open_orders
            .iter()
            .find(|o| Self::matches(o, lookup))
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound {
                message: "Order does not exist.".to_string(),
            })
    }

    async fn open_orders(&self) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let state = self.state.lock();
        if let Some(error) = &state.open_orders_error {
            return Err(error.clone());
        }
        Ok(state.open_orders.clone())
    }

    async fn recent_trades(
        &self,
        instrument: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExchangeTrade>, ExchangeError> {
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .filter(|t| t.instrument == instrument && t.executed_at >= since)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Service wiring
// =============================================================================

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub catalog: Arc<StaticInstrumentCatalog>,
    pub lifecycle: Arc<OrderLifecycleService<InMemoryStore>>,
    pub ingestion: Arc<ExecutionIngestionService<InMemoryStore>>,
    pub exchange: Arc<FakeExchange>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Arc::new(StaticInstrumentCatalog::new(
            &[
                InstrumentDefinition::new(INSTRUMENT),
                InstrumentDefinition::new("ETHUSDT"),
            ],
            Vec::new(),
        ));
        let outbox = OutboxWriter::new(TOPIC_PREFIX);
        let lifecycle = Arc::new(OrderLifecycleService::new(
            Arc::clone(&store),
            catalog.clone(),
            outbox.clone(),
        ));
        let ingestion = Arc::new(ExecutionIngestionService::new(
            Arc::clone(&store),
            Arc::clone(&lifecycle),
            catalog.clone(),
            outbox,
        ));
        Self {
            store,
            catalog,
            lifecycle,
            ingestion,
            exchange: Arc::new(FakeExchange::new()),
        }
    }

    /// Harness with `amount` USDT available on the default account.
    pub async fn funded(amount: Decimal) -> Self {
        let harness = Self::new();
        harness
            .store
            .seed_balance(&account(), "USDT", amount)
            .await;
        harness
    }

    pub fn exchange_port(&self) -> Arc<dyn ExchangePort> {
        self.exchange.clone()
    }

    /// Create an order and acknowledge it as `exchange_order_id`.
    pub async fn acknowledged_order(
        &self,
        command: CreateOrderCommand,
        exchange_order_id: &str,
    ) -> Order {
        let order = self.lifecycle.create(command).await.unwrap();
        self.lifecycle
            .acknowledge(
                order.id(),
                EXCHANGE,
                exchange_order_id,
                Some(order.outbound_client_order_id()),
            )
            .await
            .unwrap();
        self.lifecycle.get(order.id()).await.unwrap()
    }
}

/// Retry executor that never sleeps long.
pub fn fast_retry() -> RateLimitRetryExecutor {
    RateLimitRetryExecutor::new(ExchangeRetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    })
}

// =============================================================================
// Builders
// =============================================================================

pub fn account() -> AccountId {
    AccountId::new("acct-1")
}

pub fn limit_buy(quantity: Decimal, price: Decimal) -> CreateOrderCommand {
    CreateOrderCommand {
        order_id: None,
        account_id: account(),
        instrument: INSTRUMENT.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        quantity,
        limit_price: Some(price),
        client_order_id: None,
        exchange_name: EXCHANGE.to_string(),
    }
}

/// A fill of `quantity` at `price` with a USDT fee on `exchange_order_id`.
pub fn fill(
    exchange_order_id: &str,
    trade_id: &str,
    quantity: Decimal,
    price: Decimal,
    fee: Decimal,
) -> ExecutionReport {
    ExecutionReport {
        exchange_name: EXCHANGE.to_string(),
        instrument: INSTRUMENT.to_string(),
        trade_id: trade_id.to_string(),
        exchange_order_id: Some(exchange_order_id.to_string()),
        client_order_id: None,
        side: OrderSide::Buy,
        quantity,
        price,
        fee_asset: (fee > Decimal::ZERO).then(|| "USDT".to_string()),
        fee_amount: fee,
        reported_status: None,
        executed_at: Utc::now(),
    }
}

pub fn trade(exchange_order_id: &str, trade_id: &str, quantity: Decimal) -> ExchangeTrade {
    ExchangeTrade {
        trade_id: trade_id.to_string(),
        exchange_order_id: exchange_order_id.to_string(),
        instrument: INSTRUMENT.to_string(),
        side: OrderSide::Buy,
        quantity,
        price: dec!(50000),
        fee_asset: Some("USDT".to_string()),
        fee_amount: dec!(0.5),
        executed_at: Utc::now(),
    }
}
