//! Catch-up Poller
//!
//! Periodic reconciliation against the exchange REST API. Each cycle
//! fetches open orders, acknowledges local NEW orders the exchange already
//! holds, pulls recent trades for every active instrument and forwards them
//! to ingestion. The cycle outcome is recorded in connector health.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::connector_health::ConnectorHealthHandle;
use super::execution_ingestion::ExecutionIngestionService;
use super::order_lifecycle::OrderLifecycleService;
use super::retry_executor::RateLimitRetryExecutor;
use crate::application::ports::{
    ExchangeError, ExchangeOrder, ExchangePort, InstrumentCatalogPort, TransactionManager,
};
use crate::domain::execution::IngestOutcome;
use crate::domain::order_lifecycle::AckOutcome;
use crate::domain::outbox::before;

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct CatchUpPollerConfig {
    /// Exchange name the connector serves.
    pub exchange_name: String,
    /// Delay between cycles.
    pub interval: Duration,
    /// How far back trades are fetched.
    pub trade_lookback: Duration,
}

/// Counts from one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Open orders the exchange reported.
    pub open_orders: u64,
    /// Local orders acknowledged from the open-order list.
    pub acknowledged: u64,
    /// Trades fetched.
    pub trades: u64,
    /// Trades applied.
    pub inserted: u64,
    /// Trades already ingested.
    pub duplicates: u64,
    /// Trades with no local order.
    pub unmapped: u64,
    /// Trades that failed to apply.
    pub failed: u64,
}

impl CycleReport {
    /// Health error code for a cycle whose trades did not all apply.
    pub const FILL_APPLY_CODE: &'static str = "FILL_APPLY";

    /// True when every fetched trade was applied, deduplicated or unmapped.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Human-readable summary of the failed trades.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        format!("{} of {} trades failed to apply", self.failed, self.trades)
    }
}

/// Reconciles local state with the exchange on a fixed interval.
pub struct CatchUpPoller<T>
where
    T: TransactionManager,
{
    exchange: Arc<dyn ExchangePort>,
    retry: RateLimitRetryExecutor,
    lifecycle: Arc<OrderLifecycleService<T>>,
    ingestion: Arc<ExecutionIngestionService<T>>,
    catalog: Arc<dyn InstrumentCatalogPort>,
    health: ConnectorHealthHandle,
    config: CatchUpPollerConfig,
}

impl<T> CatchUpPoller<T>
where
    T: TransactionManager,
{
    /// Create a new CatchUpPoller.
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        retry: RateLimitRetryExecutor,
        lifecycle: Arc<OrderLifecycleService<T>>,
        ingestion: Arc<ExecutionIngestionService<T>>,
        catalog: Arc<dyn InstrumentCatalogPort>,
        health: ConnectorHealthHandle,
        config: CatchUpPollerConfig,
    ) -> Self {
        Self {
            exchange,
            retry,
            lifecycle,
            ingestion,
            catalog,
            health,
            config,
        }
    }

    /// Exchange this poller reconciles.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.config.exchange_name
    }

    /// Run one cycle and record its outcome in connector health.
    ///
    /// A cycle with trades that failed to apply returns `Ok` but is recorded
    /// as a `FILL_APPLY` error rather than a success.
    ///
    /// # Errors
    ///
    /// Returns the exchange error that aborted the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, ExchangeError> {
        let threshold = self.health.down_threshold();
        match self.reconcile().await {
            Ok(report) => {
                let now = Utc::now();
                if report.is_complete() {
                    self.health
                        .update(|h| {
                            h.record_poll_success(report.open_orders, report.trades, threshold, now);
                        })
                        .await;
                } else {
                    let message = report.failure_summary();
                    self.health
                        .update(|h| {
                            h.record_poll_incomplete(
                                report.open_orders,
                                report.trades,
                                CycleReport::FILL_APPLY_CODE,
                                &message,
                                threshold,
                                now,
                            );
                        })
                        .await;
                    tracing::warn!(
                        exchange = %self.config.exchange_name,
                        failed = report.failed,
                        trades = report.trades,
                        "Catch-up cycle left trades unapplied"
                    );
                }
                tracing::debug!(
                    exchange = %self.config.exchange_name,
                    open_orders = report.open_orders,
                    acknowledged = report.acknowledged,
                    trades = report.trades,
                    inserted = report.inserted,
                    duplicates = report.duplicates,
                    unmapped = report.unmapped,
                    failed = report.failed,
                    "Catch-up cycle complete"
                );
                Ok(report)
            }
            Err(err) => {
                let now = Utc::now();
                let message = err.to_string();
                self.health
                    .update(|h| h.record_poll_failure(err.code(), &message, threshold, now))
                    .await;
                tracing::warn!(
                    exchange = %self.config.exchange_name,
                    error = %err,
                    "Catch-up cycle failed"
                );
                Err(err)
            }
        }
    }

    /// Run a cycle at startup and then on every interval tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            exchange = %self.config.exchange_name,
            interval_ms = self.config.interval.as_millis() as u64,
            "Catch-up poller started"
        );
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let _ = self.run_cycle().await;
        }
        tracing::info!(exchange = %self.config.exchange_name, "Catch-up poller stopped");
    }

    async fn reconcile(&self) -> Result<CycleReport, ExchangeError> {
        let mut report = CycleReport::default();

        let open_orders = self
            .retry
            .execute("open_orders", || self.exchange.open_orders())
            .await?;
        report.open_orders = open_orders.len() as u64;
        report.acknowledged = self.acknowledge_open(&open_orders).await;

        let mut instruments: BTreeSet<String> =
            self.catalog.active_instruments().into_iter().collect();
        instruments.extend(open_orders.iter().map(|o| o.instrument.to_uppercase()));

        let since = before(Utc::now(), self.config.trade_lookback);
        for instrument in &instruments {
            let trades = self
                .retry
                .execute("recent_trades", || {
                    self.exchange.recent_trades(instrument, since)
                })
                .await?;
            report.trades += trades.len() as u64;

            for trade in trades {
                let fill = trade.into_report(&self.config.exchange_name);
                match self.ingestion.process_fill(&fill).await {
                    Ok(IngestOutcome::Inserted { .. }) => report.inserted += 1,
                    Ok(IngestOutcome::Duplicate) => report.duplicates += 1,
                    Ok(IngestOutcome::Unmapped) => report.unmapped += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(
                            exchange = %self.config.exchange_name,
                            instrument = %instrument,
                            trade_id = %fill.trade_id,
                            error = %err,
                            "Failed to apply polled trade"
                        );
                    }
                }
            }
        }
        Ok(report)
    }

    /// Acknowledge local NEW orders whose outbound client id the exchange
    /// lists as open.
    async fn acknowledge_open(&self, open_orders: &[ExchangeOrder]) -> u64 {
        let by_client_id: HashMap<&str, &ExchangeOrder> = open_orders
            .iter()
            .filter_map(|o| o.client_order_id.as_deref().map(|cid| (cid, o)))
            .collect();
        if by_client_id.is_empty() {
            return 0;
        }

        let pending = match self
            .lifecycle
            .awaiting_acknowledgement(&self.config.exchange_name)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "Could not load orders awaiting acknowledgement");
                return 0;
            }
        };

        let mut acknowledged = 0;
        for order in pending {
            let Some(remote) = by_client_id.get(order.outbound_client_order_id()) else {
                continue;
            };
            match self
                .lifecycle
                .acknowledge(
                    order.id(),
                    &self.config.exchange_name,
                    &remote.exchange_order_id,
                    remote.client_order_id.as_deref(),
                )
                .await
            {
                Ok(AckOutcome::Acknowledged(_)) => acknowledged += 1,
                Ok(AckOutcome::AlreadyAcknowledged) => {}
                Err(err) => {
                    tracing::warn!(
                        order_id = %order.id(),
                        exchange_order_id = %remote.exchange_order_id,
                        error = %err,
                        "Could not acknowledge order from open-order list"
                    );
                }
            }
        }
        acknowledged
    }
}
