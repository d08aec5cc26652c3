//! Stream codec: text frames to stream events.

use chrono::{DateTime, TimeZone, Utc};

use super::frames::{ExecutionReportFrame, UserDataFrame};
use crate::application::ports::{StreamError, StreamEvent};
use crate::domain::execution::{ExecutionReport, StatusReport};
use crate::domain::order_lifecycle::{OrderSide, OrderStatus};

/// Decodes user data stream frames for one exchange.
#[derive(Debug, Clone)]
pub struct ExecutionReportCodec {
    exchange_name: String,
}

impl ExecutionReportCodec {
    /// Create a codec stamping events with `exchange_name`.
    #[must_use]
    pub fn new(exchange_name: impl Into<String>) -> Self {
        Self {
            exchange_name: exchange_name.into(),
        }
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Decode`] for malformed frames and
    /// [`StreamError::Transport`] when the server expired the listen key.
    pub fn decode(&self, text: &str) -> Result<StreamEvent, StreamError> {
        let mut value: serde_json::Value = serde_json::from_str(text).map_err(decode_error)?;
        if value.get("event").is_some_and(serde_json::Value::is_object) {
            value = value["event"].take();
        }
        if value.get("e").is_none() {
            return Ok(StreamEvent::Ignored);
        }

        match serde_json::from_value::<UserDataFrame>(value).map_err(decode_error)? {
            UserDataFrame::ExecutionReport(frame) => self.execution_report(&frame),
            UserDataFrame::ListenKeyExpired => Err(StreamError::Transport {
                message: "listen key expired".to_string(),
            }),
            UserDataFrame::AccountPosition
            | UserDataFrame::BalanceUpdate
            | UserDataFrame::ListStatus
            | UserDataFrame::Other => Ok(StreamEvent::Ignored),
        }
    }

    fn execution_report(&self, frame: &ExecutionReportFrame) -> Result<StreamEvent, StreamError> {
        let side = OrderSide::from_exchange(&frame.side).ok_or_else(|| StreamError::Decode {
            message: format!("unknown side {}", frame.side),
        })?;
        let status = OrderStatus::from_exchange(&frame.order_status);

        if frame.is_trade() {
            return Ok(StreamEvent::Execution(ExecutionReport {
                exchange_name: self.exchange_name.clone(),
                instrument: frame.symbol.clone(),
                trade_id: frame.trade_id.to_string(),
                exchange_order_id: Some(frame.order_id.to_string()),
                client_order_id: Some(frame.order_client_id().to_string()),
                side,
                quantity: frame.last_quantity,
                price: frame.last_price,
                fee_asset: frame
                    .commission_asset
                    .clone()
                    .filter(|asset| !asset.is_empty()),
                fee_amount: frame.commission.unwrap_or_default(),
                reported_status: status,
                executed_at: timestamp(frame.transaction_time)?,
            }));
        }

        // PENDING_CANCEL and friends carry nothing to apply.
        let Some(status) = status else {
            return Ok(StreamEvent::Ignored);
        };
        Ok(StreamEvent::Status(StatusReport {
            exchange_name: self.exchange_name.clone(),
            instrument: frame.symbol.clone(),
            exchange_order_id: Some(frame.order_id.to_string()),
            client_order_id: Some(frame.order_client_id().to_string()),
            status,
            reason: frame
                .reject_reason
                .clone()
                .filter(|reason| !reason.is_empty() && reason != "NONE"),
            reported_at: timestamp(frame.event_time)?,
        }))
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, StreamError> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| StreamError::Decode {
        message: format!("bad timestamp {millis}"),
    })
}

fn decode_error(err: serde_json::Error) -> StreamError {
    StreamError::Decode {
        message: err.to_string(),
    }
}
