//! Order Submission Worker
//!
//! Consumer-group member on the `order-submitted` topic. Each message is
//! handed to [`SubmitToExchangeUseCase`] and acknowledged to the broker
//! only once local processing succeeded; failed deliveries stay pending
//! and are read again on a later pass.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConsumedMessage, MessageConsumerPort, TransactionManager};
use crate::application::use_cases::{SubmissionOutcome, SubmitToExchangeUseCase};
use crate::domain::outbox::{EventEnvelope, EventPayload, OrderSubmittedV1};
use crate::error::SettlementResult;

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct OrderSubmissionWorkerConfig {
    /// Messages per receive.
    pub batch_size: usize,
    /// Longest wait for new messages.
    pub block: Duration,
    /// Pause after a failed delivery.
    pub failure_backoff: Duration,
}

impl Default for OrderSubmissionWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            block: Duration::from_secs(2),
            failure_backoff: Duration::from_secs(1),
        }
    }
}

/// Counts from one receive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Messages received.
    pub received: usize,
    /// Orders acknowledged by the exchange.
    pub acknowledged: usize,
    /// Orders the exchange refused.
    pub rejected: usize,
    /// Orders no longer waiting for submission.
    pub skipped: usize,
    /// Messages discarded as malformed.
    pub malformed: usize,
    /// Deliveries left pending for retry.
    pub failed: usize,
}

/// Drives order placement from the broker.
pub struct OrderSubmissionWorker<T, C>
where
    T: TransactionManager,
    C: MessageConsumerPort,
{
    consumer: Arc<C>,
    submit: Arc<SubmitToExchangeUseCase<T>>,
    config: OrderSubmissionWorkerConfig,
}

impl<T, C> OrderSubmissionWorker<T, C>
where
    T: TransactionManager,
    C: MessageConsumerPort,
{
    /// Create a new OrderSubmissionWorker.
    pub const fn new(
        consumer: Arc<C>,
        submit: Arc<SubmitToExchangeUseCase<T>>,
        config: OrderSubmissionWorkerConfig,
    ) -> Self {
        Self {
            consumer,
            submit,
            config,
        }
    }

    /// Receive one batch and process it.
    pub async fn poll_once(&self) -> SettlementResult<SubmissionReport> {
        let messages = self
            .consumer
            .receive(self.config.batch_size, self.config.block)
            .await?;
        let mut report = SubmissionReport {
            received: messages.len(),
            ..SubmissionReport::default()
        };

        for message in messages {
            self.handle(&message, &mut report).await?;
        }
        Ok(report)
    }

    async fn handle(
        &self,
        message: &ConsumedMessage,
        report: &mut SubmissionReport,
    ) -> SettlementResult<()> {
        let envelope = match serde_json::from_value::<EventEnvelope<OrderSubmittedV1>>(
            message.payload.clone(),
        ) {
            Ok(envelope) if envelope.schema_version == OrderSubmittedV1::SCHEMA_VERSION => envelope,
            Ok(envelope) => {
                tracing::warn!(
                    delivery_id = %message.delivery_id,
                    schema_version = envelope.schema_version,
                    "Unsupported order-submitted schema, discarding"
                );
                report.malformed += 1;
                return Ok(self.consumer.ack(&message.delivery_id).await?);
            }
            Err(err) => {
                tracing::warn!(
                    delivery_id = %message.delivery_id,
                    error = %err,
                    "Malformed order-submitted message, discarding"
                );
                report.malformed += 1;
                return Ok(self.consumer.ack(&message.delivery_id).await?);
            }
        };

        let order_id = &envelope.payload.order_id;
        match self.submit.execute(order_id).await {
            Ok(outcome) => {
                match outcome {
                    SubmissionOutcome::Acknowledged { .. } => report.acknowledged += 1,
                    SubmissionOutcome::Rejected { .. } => report.rejected += 1,
                    SubmissionOutcome::Skipped(_) => report.skipped += 1,
                }
                self.consumer.ack(&message.delivery_id).await?;
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    delivery_id = %message.delivery_id,
                    order_id = %order_id,
                    error = %err,
                    "Order submission failed, leaving delivery pending"
                );
            }
        }
        Ok(())
    }

    /// Process batches until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(batch_size = self.config.batch_size, "Order submission worker started");
        loop {
            let polled = tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.poll_once() => polled,
            };
            let pause = match polled {
                Ok(report) if report.failed == 0 => None,
                Ok(_) => Some(self.config.failure_backoff),
                Err(err) => {
                    tracing::error!(error = %err, "Order submission poll failed");
                    Some(self.config.failure_backoff)
                }
            };
            if let Some(pause) = pause {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(pause) => {}
                }
            }
        }
        tracing::info!("Order submission worker stopped");
    }
}
