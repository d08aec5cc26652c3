//! Prometheus metrics for the settlement engine.
//!
//! Counters and gauges are recorded where the work happens; this module
//! installs the exporter and registers descriptions.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `orders_created_total` | counter | |
//! | `orders_canceled_total` | counter | |
//! | `orders_rejected_total` | counter | |
//! | `fills_ingested_total` | counter | `outcome` |
//! | `outbox_events_published_total` | counter | `topic` |
//! | `outbox_events_dead_total` | counter | |
//! | `outbox_events_reclaimed_total` | counter | |
//! | `outbox_last_batch_size` | gauge | |
//! | `exchange_retries_total` | counter | `operation` |
//! | `connector_reconnects_total` | counter | `connector` |

use std::net::SocketAddr;

use metrics::{Unit, describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Listener on all interfaces at `port`.
    #[must_use]
    pub fn on_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener that serves `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    describe_metrics();
    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Register help text for every metric the engine records.
pub fn describe_metrics() {
    describe_counter!("orders_created_total", Unit::Count, "Orders created with funds reserved");
    describe_counter!("orders_canceled_total", Unit::Count, "Orders canceled");
    describe_counter!("orders_rejected_total", Unit::Count, "Orders rejected by the exchange");
    describe_counter!(
        "fills_ingested_total",
        Unit::Count,
        "Fills processed, by outcome (inserted, duplicate, unmapped, error)"
    );
    describe_counter!(
        "outbox_events_published_total",
        Unit::Count,
        "Outbox events delivered to the broker"
    );
    describe_counter!(
        "outbox_events_dead_total",
        Unit::Count,
        "Outbox events quarantined after exhausting retries"
    );
    describe_counter!(
        "outbox_events_reclaimed_total",
        Unit::Count,
        "Outbox leases reclaimed after the processing timeout"
    );
    describe_gauge!(
        "outbox_last_batch_size",
        Unit::Count,
        "Rows claimed by the latest dispatch pass"
    );
    describe_counter!(
        "exchange_retries_total",
        Unit::Count,
        "Exchange calls retried after rate limiting or transient failure"
    );
    describe_counter!(
        "connector_reconnects_total",
        Unit::Count,
        "Push-stream reconnect attempts"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_on_port() {
        let config = MetricsConfig::on_port(9464);
        assert_eq!(config.listen_addr.port(), 9464);
        assert!(config.listen_addr.ip().is_unspecified());
    }

    #[test]
    fn test_describe_without_recorder() {
        // No global recorder installed: descriptions are no-ops.
        describe_metrics();
    }
}
