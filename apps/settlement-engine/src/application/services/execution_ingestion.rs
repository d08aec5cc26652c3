//! Execution Ingestion Service
//!
//! Applies exchange fills and non-fill status reports. A fill is one unit
//! of work: execution row, wallet settlement, ledger posting, order
//! progress, audit event and outbox rows.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde_json::json;

use super::order_lifecycle::OrderLifecycleService;
use super::outbox_writer::OutboxWriter;
use super::wallet_settlement::{WalletSettlement, merge_balance};
use crate::application::ports::{InstrumentCatalogPort, TransactionManager, UnitOfWork};
use crate::domain::execution::{
    Execution, ExecutionReport, ExecutionRepository, FillEconomics, IngestOutcome, InsertOutcome,
    ReconcileOutcome, StatusReport,
};
use crate::domain::ledger::{LedgerRepository, LedgerTransaction};
use crate::domain::order_lifecycle::{
    AckOutcome, Order, OrderEventRecord, OrderEventType, OrderRepository, OrderStatus,
};
use crate::domain::outbox::ExecutionRecordedV1;
use crate::domain::wallet::ReservationStatus;
use crate::error::{SettlementError, SettlementResult};

/// Service applying exchange reports to local state.
pub struct ExecutionIngestionService<T>
where
    T: TransactionManager,
{
    transactions: Arc<T>,
    lifecycle: Arc<OrderLifecycleService<T>>,
    catalog: Arc<dyn InstrumentCatalogPort>,
    outbox: OutboxWriter,
}

impl<T> ExecutionIngestionService<T>
where
    T: TransactionManager,
{
    /// Create a new ExecutionIngestionService.
    pub fn new(
        transactions: Arc<T>,
        lifecycle: Arc<OrderLifecycleService<T>>,
        catalog: Arc<dyn InstrumentCatalogPort>,
        outbox: OutboxWriter,
    ) -> Self {
        Self {
            transactions,
            lifecycle,
            catalog,
            outbox,
        }
    }

    /// Apply one fill.
    ///
    /// Re-delivery of a trade already ingested is reported as
    /// [`IngestOutcome::Duplicate`] and changes nothing.
    pub async fn process_fill(&self, report: &ExecutionReport) -> SettlementResult<IngestOutcome> {
        let result = self.apply_fill(report).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        counter!("fills_ingested_total", "outcome" => label).increment(1);
        result
    }

    async fn apply_fill(&self, report: &ExecutionReport) -> SettlementResult<IngestOutcome> {
        report.validate()?;
        let now = Utc::now();
        let mut tx = self.transactions.begin().await?;

        let Some(mut order) = resolve_order(
            &mut tx,
            &report.exchange_name,
            report.exchange_order_id.as_deref(),
            report.client_order_id.as_deref(),
        )
        .await?
        else {
            tracing::warn!(
                exchange = %report.exchange_name,
                instrument = %report.instrument,
                trade_id = %report.trade_id,
                exchange_order_id = report.exchange_order_id.as_deref(),
                "Fill does not match any local order"
            );
            return Ok(IngestOutcome::Unmapped);
        };

        let execution =
            Execution::from_report(report, order.id().clone(), order.account_id().clone());
        if tx.insert_execution(&execution).await? == InsertOutcome::Duplicate {
            tracing::debug!(
                trade_id = %report.trade_id,
                order_id = %order.id(),
                "Fill already ingested"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let pair = self
            .catalog
            .asset_pair(&report.instrument)
            .ok_or_else(|| SettlementError::UnknownInstrument(report.instrument.clone()))?;
        let economics = FillEconomics::of(&execution, &pair);

        let mut balances = WalletSettlement::settle_fill(
            &mut tx,
            order.account_id(),
            order.id(),
            &economics.net_deltas(),
            now,
        )
        .await?;

        let ledger = LedgerTransaction::for_execution(&execution, &economics, now)?;
        tx.insert_ledger_transaction(&ledger).await?;

        let fill = order.apply_fill(report.quantity, report.reported_status, now)?;
        tx.update_order(&order).await?;

        if let Some(closing) = closing_reservation_status(order.status())
            && let Some(balance) =
                WalletSettlement::release_for_order(&mut tx, order.id(), closing, now).await?
        {
            merge_balance(&mut balances, balance);
        }

        tx.append_order_event(&OrderEventRecord::new(
            order.id().clone(),
            OrderEventType::ExecutionApplied,
            Some(fill.transition.from),
            fill.transition.to,
            json!({
                "execution_id": execution.id,
                "trade_id": execution.trade_id,
                "quantity": execution.quantity,
                "price": execution.price,
                "prior_filled": fill.prior_filled,
                "new_filled": fill.new_filled,
            }),
            now,
        ))
        .await?;

        self.outbox
            .enqueue(&mut tx, &ExecutionRecordedV1::from(&execution), now)
            .await?;
        self.outbox
            .order_updated(&mut tx, &order, fill.transition.from, None, now)
            .await?;
        self.outbox
            .balances_updated(&mut tx, &balances, "EXECUTION_SETTLED", Some(order.id()), now)
            .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            execution_id = %execution.id,
            trade_id = %execution.trade_id,
            quantity = %execution.quantity,
            price = %execution.price,
            status = %order.status(),
            "Fill applied"
        );
        Ok(IngestOutcome::Inserted {
            execution_id: execution.id,
            order_id: order.id().clone(),
            status: order.status(),
        })
    }

    /// Apply an exchange status that carries no fill.
    pub async fn process_status_report(
        &self,
        report: &StatusReport,
    ) -> SettlementResult<ReconcileOutcome> {
        let now = Utc::now();
        let mut tx = self.transactions.begin().await?;

        let Some(mut order) = resolve_order(
            &mut tx,
            &report.exchange_name,
            report.exchange_order_id.as_deref(),
            report.client_order_id.as_deref(),
        )
        .await?
        else {
            return Ok(ReconcileOutcome::Unmapped);
        };

        if report.status == OrderStatus::Acknowledged {
            tx.rollback().await?;
            return self.acknowledge_from_report(&order, report).await;
        }

        let Some(transition) = order.apply_reported_status(report.status, now)? else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        tx.update_order(&order).await?;

        let released = match closing_reservation_status(transition.to) {
            Some(status) => {
                WalletSettlement::release_for_order(&mut tx, order.id(), status, now).await?
            }
            None => None,
        };

        let reason = report.reason.as_deref();
        tx.append_order_event(&OrderEventRecord::new(
            order.id().clone(),
            OrderEventType::StatusReconciled,
            Some(transition.from),
            transition.to,
            json!({ "reported_status": report.status, "reason": reason }),
            now,
        ))
        .await?;
        self.outbox
            .order_updated(&mut tx, &order, transition.from, reason, now)
            .await?;
        if let Some(balance) = released {
            self.outbox
                .balances_updated(&mut tx, &[balance], "ORDER_CLOSED", Some(order.id()), now)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id(),
            from = %transition.from,
            to = %transition.to,
            "Order status reconciled"
        );
        Ok(ReconcileOutcome::Applied(transition.to))
    }

    async fn acknowledge_from_report(
        &self,
        order: &Order,
        report: &StatusReport,
    ) -> SettlementResult<ReconcileOutcome> {
        let Some(exchange_order_id) = report.exchange_order_id.as_deref() else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        if order.status() != OrderStatus::New {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let outcome = self
            .lifecycle
            .acknowledge(
                order.id(),
                &report.exchange_name,
                exchange_order_id,
                report.client_order_id.as_deref(),
            )
            .await?;
        Ok(match outcome {
            AckOutcome::Acknowledged(_) => ReconcileOutcome::Applied(OrderStatus::Acknowledged),
            AckOutcome::AlreadyAcknowledged => ReconcileOutcome::Unchanged,
        })
    }
}

/// How an order's reservation closes when the order reaches `status`.
const fn closing_reservation_status(status: OrderStatus) -> Option<ReservationStatus> {
    match status {
        OrderStatus::Canceled => Some(ReservationStatus::Released),
        OrderStatus::Rejected => Some(ReservationStatus::Cancelled),
        OrderStatus::Filled => Some(ReservationStatus::Consumed),
        _ => None,
    }
}

/// Find the order a report refers to: exchange order id first, client
/// order id second.
async fn resolve_order<U>(
    tx: &mut U,
    exchange_name: &str,
    exchange_order_id: Option<&str>,
    client_order_id: Option<&str>,
) -> SettlementResult<Option<Order>>
where
    U: UnitOfWork,
{
    if let Some(exchange_order_id) = exchange_order_id
        && let Some(order) = tx
            .lock_order_by_exchange_order_id(exchange_name, exchange_order_id)
            .await?
    {
        return Ok(Some(order));
    }
    if let Some(client_order_id) = client_order_id {
        return Ok(tx
            .lock_order_by_client_order_id(exchange_name, client_order_id)
            .await?);
    }
    Ok(None)
}
