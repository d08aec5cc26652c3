//! In-memory store.
//!
//! A unit of work holds the store-wide lock for its whole life and writes
//! to a private copy of the state; commit swaps the copy in, drop discards
//! it. Serializing every unit this way gives the same isolation the row
//! locks provide in PostgreSQL. Pool-level calls (outbox relay, connector
//! state) take the same lock briefly, so they must not be awaited while a
//! unit of work is open on the same task.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::ports::{TransactionManager, UnitOfWork};
use crate::domain::connector::{
    ConnectorHealthState, ConnectorReplayRequest, ConnectorStateRepository, ReplayEnqueueOutcome,
    ReplayStatus,
};
use crate::domain::execution::{Execution, ExecutionRepository, InsertOutcome};
use crate::domain::ledger::{LedgerRepository, LedgerTransaction};
use crate::domain::order_lifecycle::{Order, OrderEventRecord, OrderRepository, OrderStatus};
use crate::domain::outbox::{
    OutboxEvent, OutboxRelayStore, OutboxRepository, OutboxStatus, before,
};
use crate::domain::shared::{
    AccountId, OrderId, OutboxEventId, ReplayRequestId, RepositoryError,
};
use crate::domain::wallet::{
    ReservationStatus, WalletBalance, WalletRepository, WalletReservation,
};

#[derive(Debug, Default, Clone)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    order_events: Vec<OrderEventRecord>,
    executions: Vec<Execution>,
    execution_keys: HashSet<(String, String, String)>,
    balances: BTreeMap<(AccountId, String), WalletBalance>,
    reservations: Vec<WalletReservation>,
    ledger: Vec<LedgerTransaction>,
    outbox: Vec<OutboxEvent>,
    health: BTreeMap<String, ConnectorHealthState>,
    replays: Vec<ConnectorReplayRequest>,
}

impl State {
    fn order_where(&self, predicate: impl Fn(&Order) -> bool) -> Option<Order> {
        self.orders.values().find(|o| predicate(o)).cloned()
    }

    fn outbox_mut(&mut self, id: &OutboxEventId) -> Result<&mut OutboxEvent, RepositoryError> {
        self.outbox
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "outbox_event",
                id: id.to_string(),
            })
    }

    fn replay_mut(
        &mut self,
        id: &ReplayRequestId,
    ) -> Result<&mut ConnectorReplayRequest, RepositoryError> {
        self.replays
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "connector_replay_request",
                id: id.to_string(),
            })
    }
}

/// Process-local store implementing every repository trait.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to an account's available balance.
    pub async fn seed_balance(&self, account_id: &AccountId, asset: &str, amount: Decimal) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let balance = state
            .balances
            .entry((account_id.clone(), asset.to_string()))
            .or_insert_with(|| WalletBalance::empty(account_id.clone(), asset, now));
        balance.available += amount;
        balance.updated_at = now;
    }

    /// Current balance, if the row exists.
    pub async fn balance(&self, account_id: &AccountId, asset: &str) -> Option<WalletBalance> {
        let state = self.state.lock().await;
        state
            .balances
            .get(&(account_id.clone(), asset.to_string()))
            .cloned()
    }

    /// Current order row.
    pub async fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.state.lock().await.orders.get(order_id).cloned()
    }

    /// Every outbox row in creation order.
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    /// Every ingested execution.
    pub async fn executions(&self) -> Vec<Execution> {
        self.state.lock().await.executions.clone()
    }

    /// Every ledger transaction.
    pub async fn ledger_transactions(&self) -> Vec<LedgerTransaction> {
        self.state.lock().await.ledger.clone()
    }

    /// Reservations of one order.
    pub async fn reservations_for(&self, order_id: &OrderId) -> Vec<WalletReservation> {
        self.state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Audit trail of one order.
    pub async fn order_events(&self, order_id: &OrderId) -> Vec<OrderEventRecord> {
        self.state
            .lock()
            .await
            .order_events
            .iter()
            .filter(|e| &e.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Every replay request.
    pub async fn replay_requests(&self) -> Vec<ConnectorReplayRequest> {
        self.state.lock().await.replays.clone()
    }
}

/// Open unit of work over an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryUnitOfWork { guard, working })
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self) -> Result<(), RepositoryError> {
        let Self { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        if self.working.orders.contains_key(order.id()) {
            return Err(RepositoryError::Storage(format!(
                "duplicate order id {}",
                order.id()
            )));
        }
        if let Some(cid) = order.client_order_id()
            && self.working.orders.values().any(|o| {
                o.exchange_name() == order.exchange_name() && o.client_order_id() == Some(cid)
            })
        {
            return Err(RepositoryError::Storage(format!(
                "duplicate client order id {cid}"
            )));
        }
        self.working.orders.insert(order.id().clone(), order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .orders
            .get_mut(order.id())
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "order",
                id: order.id().to_string(),
            })?;
        *slot = order.clone();
        Ok(())
    }

    async fn find_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn lock_order(&mut self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn lock_order_by_exchange_order_id(
        &mut self,
        exchange_name: &str,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.order_where(|o| {
            o.exchange_name() == exchange_name && o.exchange_order_id() == Some(exchange_order_id)
        }))
    }

    async fn lock_order_by_client_order_id(
        &mut self,
        exchange_name: &str,
        client_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.order_where(|o| {
            o.exchange_name() == exchange_name
                && (o.exchange_client_order_id() == Some(client_order_id)
                    || o.outbound_client_order_id() == client_order_id)
        }))
    }

    async fn find_orders_by_status(
        &mut self,
        exchange_name: &str,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| o.exchange_name() == exchange_name && o.status() == status)
            .cloned()
            .collect();
        orders.sort_by_key(Order::created_at);
        Ok(orders)
    }

    async fn append_order_event(&mut self, event: &OrderEventRecord) -> Result<(), RepositoryError> {
        self.working.order_events.push(event.clone());
        Ok(())
    }

    async fn list_order_events(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEventRecord>, RepositoryError> {
        Ok(self
            .working
            .order_events
            .iter()
            .filter(|e| &e.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryUnitOfWork {
    async fn insert_execution(
        &mut self,
        execution: &Execution,
    ) -> Result<InsertOutcome, RepositoryError> {
        let key = (
            execution.exchange_name.clone(),
            execution.instrument.clone(),
            execution.trade_id.clone(),
        );
        if !self.working.execution_keys.insert(key) {
            return Ok(InsertOutcome::Duplicate);
        }
        self.working.executions.push(execution.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn list_executions_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<Execution>, RepositoryError> {
        Ok(self
            .working
            .executions
            .iter()
            .filter(|e| &e.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WalletRepository for InMemoryUnitOfWork {
    async fn lock_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<WalletBalance, RepositoryError> {
        let balance = self
            .working
            .balances
            .entry((account_id.clone(), asset.to_string()))
            .or_insert_with(|| WalletBalance::empty(account_id.clone(), asset, Utc::now()));
        Ok(balance.clone())
    }

    async fn save_balance(&mut self, balance: &WalletBalance) -> Result<(), RepositoryError> {
        self.working.balances.insert(
            (balance.account_id.clone(), balance.asset.clone()),
            balance.clone(),
        );
        Ok(())
    }

    async fn find_balance(
        &mut self,
        account_id: &AccountId,
        asset: &str,
    ) -> Result<Option<WalletBalance>, RepositoryError> {
        Ok(self
            .working
            .balances
            .get(&(account_id.clone(), asset.to_string()))
            .cloned())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError> {
        if reservation.status == ReservationStatus::Active
            && self.working.reservations.iter().any(|r| {
                r.order_id == reservation.order_id && r.status == ReservationStatus::Active
            })
        {
            return Err(RepositoryError::Storage(format!(
                "order {} already has an active reservation",
                reservation.order_id
            )));
        }
        self.working.reservations.push(reservation.clone());
        Ok(())
    }

    async fn lock_active_reservation(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<WalletReservation>, RepositoryError> {
        Ok(self
            .working
            .reservations
            .iter()
            .find(|r| &r.order_id == order_id && r.status == ReservationStatus::Active)
            .cloned())
    }

    async fn save_reservation(
        &mut self,
        reservation: &WalletReservation,
    ) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .reservations
            .iter_mut()
            .find(|r| r.id == reservation.id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "wallet_reservation",
                id: reservation.id.to_string(),
            })?;
        *slot = reservation.clone();
        Ok(())
    }

    async fn list_reservations_for_order(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Vec<WalletReservation>, RepositoryError> {
        Ok(self
            .working
            .reservations
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryUnitOfWork {
    async fn insert_ledger_transaction(
        &mut self,
        transaction: &LedgerTransaction,
    ) -> Result<(), RepositoryError> {
        self.working.ledger.push(transaction.clone());
        Ok(())
    }

    async fn list_ledger_transactions(
        &mut self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerTransaction>, RepositoryError> {
        Ok(self
            .working
            .ledger
            .iter()
            .filter(|t| t.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryUnitOfWork {
    async fn enqueue_outbox(&mut self, event: &OutboxEvent) -> Result<(), RepositoryError> {
        self.working.outbox.push(event.clone());
        Ok(())
    }

    async fn list_outbox_for_aggregate(
        &mut self,
        aggregate_id: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        Ok(self
            .working
            .outbox
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxRelayStore for InMemoryStore {
    async fn reclaim_stale(
        &self,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let cutoff = before(now, lease);
        let mut state = self.state.lock().await;
        let mut reclaimed = 0;
        for event in &mut state.outbox {
            if event.status == OutboxStatus::Processing
                && event.processing_started_at.is_some_and(|at| at < cutoff)
            {
                event.reclaim(now);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn claim_batch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let mut state = self.state.lock().await;
        let mut claimed = Vec::new();
        for event in &mut state.outbox {
            if claimed.len() >= limit {
                break;
            }
            if event.status.is_claimable() && event.next_attempt_at <= now {
                event.mark_processing(now);
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_published(
        &self,
        id: &OutboxEventId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.state.lock().await.outbox_mut(id)?.mark_published(now);
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let event = state.outbox_mut(id)?;
        event.status = OutboxStatus::Failed;
        event.attempt_count = attempt_count;
        event.next_attempt_at = next_attempt_at;
        event.processing_started_at = None;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_dead(
        &self,
        id: &OutboxEventId,
        attempt_count: u32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let event = state.outbox_mut(id)?;
        event.status = OutboxStatus::Dead;
        event.attempt_count = attempt_count;
        event.processing_started_at = None;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn requeue_dead(
        &self,
        ids: Option<&[OutboxEventId]>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let mut requeued = 0;
        for event in &mut state.outbox {
            let selected = ids.is_none_or(|ids| ids.contains(&event.id));
            if event.status == OutboxStatus::Dead && selected {
                event.requeue(now);
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn find_outbox_event(
        &self,
        id: &OutboxEventId,
    ) -> Result<Option<OutboxEvent>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.outbox.iter().find(|e| &e.id == id).cloned())
    }
}

#[async_trait]
impl ConnectorStateRepository for InMemoryStore {
    async fn upsert_health(&self, state: &ConnectorHealthState) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .health
            .insert(state.connector_name.clone(), state.clone());
        Ok(())
    }

    async fn find_health(
        &self,
        connector_name: &str,
    ) -> Result<Option<ConnectorHealthState>, RepositoryError> {
        Ok(self.state.lock().await.health.get(connector_name).cloned())
    }

    async fn enqueue_replay(
        &self,
        request: ConnectorReplayRequest,
        dedupe_window: Duration,
    ) -> Result<ReplayEnqueueOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let window_start = before(request.requested_at, dedupe_window);
        if let Some(existing) = state.replays.iter().find(|r| {
            r.connector_name == request.connector_name
                && r.trigger == request.trigger
                && r.status.is_open()
                && r.requested_at >= window_start
        }) {
            return Ok(ReplayEnqueueOutcome::Deduplicated(existing.clone()));
        }
        state.replays.push(request.clone());
        Ok(ReplayEnqueueOutcome::Enqueued(request))
    }

    async fn claim_next_replay(
        &self,
        connector_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError> {
        let mut state = self.state.lock().await;
        let next = state
            .replays
            .iter_mut()
            .filter(|r| r.connector_name == connector_name && r.status == ReplayStatus::Pending)
            .min_by_key(|r| r.requested_at);
        Ok(next.map(|request| {
            request.status = ReplayStatus::Running;
            request.started_at = Some(now);
            request.clone()
        }))
    }

    async fn complete_replay(
        &self,
        id: &ReplayRequestId,
        status: ReplayStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let request = state.replay_mut(id)?;
        request.status = status;
        request.completed_at = Some(now);
        request.error = error.map(str::to_string);
        Ok(())
    }

    async fn find_replay_request(
        &self,
        id: &ReplayRequestId,
    ) -> Result<Option<ConnectorReplayRequest>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.replays.iter().find(|r| &r.id == id).cloned())
    }
}
