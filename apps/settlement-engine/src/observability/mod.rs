//! Observability module for logging and metrics.
//!
//! The binary initialises both once at startup. Library code only emits
//! through the `tracing` and `metrics` macros.

mod logging;
mod metrics;

pub use logging::{LoggingError, default_directive, init_tracing};
pub use self::metrics::{MetricsConfig, MetricsError, describe_metrics, init_metrics};
