//! Configuration module for the settlement engine.
//!
//! YAML configuration with environment variable interpolation and
//! validation. Every section has defaults, so an empty file is a valid
//! in-memory test configuration once the backends are switched.
//!
//! # Usage
//!
//! ```rust,ignore
//! use settlement_engine::config::load_config;
//!
//! let config = load_config(None)?;
//! println!("HTTP port: {}", config.server.http_port);
//! ```

mod connector;
mod exchange;
mod instruments;
mod messaging;
mod observability;
mod outbox;
mod persistence;
mod server;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use connector::{ConnectorConfig, PollerConfig, ReplayConfig, StreamConfig};
pub use exchange::{ExchangeConfig, RetryConfig};
pub use instruments::InstrumentsConfig;
pub use messaging::{MessagingBackend, MessagingConfig};
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};
pub use outbox::OutboxConfig;
pub use persistence::{PersistenceBackend, PersistenceConfig};
pub use server::ServerConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Operations HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store backend.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Broker backend.
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Exchange credentials, URLs and retry.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Outbox dispatcher.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Poller, stream and replay queue.
    #[serde(default)]
    pub connector: ConnectorConfig,
    /// Instrument catalog.
    #[serde(default)]
    pub instruments: InstrumentsConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

pub(crate) const fn default_true() -> bool {
    true
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// `path` defaults to `config.yaml`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.http_port == 0 {
        return Err(ConfigError::ValidationError(
            "server.http_port must be non-zero".to_string(),
        ));
    }
    config.server.socket_addr()?;
    if config
        .observability
        .metrics_port
        .is_some_and(|port| port == config.server.http_port)
    {
        return Err(ConfigError::ValidationError(
            "observability.metrics_port and server.http_port must be different".to_string(),
        ));
    }

    if config.exchange.name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "exchange.name must not be empty".to_string(),
        ));
    }
    config
        .exchange
        .environment()
        .map_err(|e| ConfigError::ValidationError(format!("exchange.environment: {e}")))?;
    let retry = &config.exchange.retry;
    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "exchange.retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "exchange.retry.jitter_factor must be between 0.0 and 1.0".to_string(),
        ));
    }

    let outbox = &config.outbox;
    if outbox.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "outbox.batch_size must be positive".to_string(),
        ));
    }
    if outbox.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "outbox.max_attempts must be positive".to_string(),
        ));
    }
    if outbox.lease_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "outbox.lease_timeout_secs must be positive".to_string(),
        ));
    }

    let connector = &config.connector;
    if connector.poller.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "connector.poller.interval_secs must be positive".to_string(),
        ));
    }
    if connector.stream.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "connector.stream.multiplier must be at least 1.0".to_string(),
        ));
    }
    if connector.stream.listen_key_keepalive_secs == 0 {
        return Err(ConfigError::ValidationError(
            "connector.stream.listen_key_keepalive_secs must be positive".to_string(),
        ));
    }
    if connector.replay.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "connector.replay.poll_interval_secs must be positive".to_string(),
        ));
    }

    if config.messaging.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "messaging.batch_size must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::InstrumentCatalogPort;
    use crate::domain::shared::AssetPair;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.persistence.backend, PersistenceBackend::Postgres);
        assert_eq!(config.messaging.backend, MessagingBackend::Redis);
        assert_eq!(config.messaging.topic_prefix, "settlement");
        assert_eq!(config.exchange.name, "binance");
        assert_eq!(config.outbox.max_attempts, 10);
        assert!(config.connector.poller.enabled);
        assert!(config.observability.metrics_port.is_none());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = match load_config_from_string("") {
            Ok(c) => c,
            Err(e) => panic!("empty config should load: {e}"),
        };
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
server:
  http_port: 9000
persistence:
  backend: memory
messaging:
  backend: memory
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.persistence.backend, PersistenceBackend::Memory);
        assert_eq!(config.messaging.backend, MessagingBackend::Memory);
        assert_eq!(config.outbox.lease_timeout_secs, 120);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "environment: ${SETTLEMENT_CONFIG_TEST_NONEXISTENT_VAR:-testnet}";
        assert_eq!(interpolate_env_vars(input), "environment: testnet");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${SETTLEMENT_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    fn test_validation_same_ports() {
        let yaml = r"
server:
  http_port: 9000
observability:
  metrics_port: 9000
";

        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for duplicate ports");
        };
        assert!(err.to_string().contains("must be different"));
    }

    #[test]
    fn test_validation_unknown_environment() {
        let yaml = r"
exchange:
  environment: staging
";

        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for unknown environment");
        };
        assert!(err.to_string().contains("exchange.environment"));
    }

    #[test]
    fn test_validation_zero_outbox_attempts() {
        let yaml = r"
outbox:
  max_attempts: 0
";

        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for zero attempts");
        };
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_invalid_log_format() {
        let yaml = r"
observability:
  logging:
    format: xml
";

        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for invalid format");
        };
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
server:
  http_port: 8081
  bind_address: "127.0.0.1"

persistence:
  backend: postgres
  database_url: "postgres://u:p@db:5432/settlement"
  max_connections: 4

messaging:
  backend: redis
  redis_url: "redis://cache:6379"
  topic_prefix: "spot"
  stream_max_len: 100000
  block_ms: 500

exchange:
  name: binance
  environment: production
  api_key: key
  api_secret: secret
  recv_window_ms: 3000
  retry:
    max_retries: 2
    initial_backoff_ms: 50

outbox:
  lease_timeout_secs: 30
  max_attempts: 4
  base_backoff_ms: 250

connector:
  poller:
    interval_secs: 10
    down_threshold_secs: 45
  stream:
    enabled: false
    max_backoff_ms: 5000
  replay:
    dedupe_window_secs: 15

instruments:
  symbols:
    - symbol: BTCUSDT
    - symbol: PEPEFDUSD
      base: PEPE
      quote: FDUSD
      active: false

observability:
  logging:
    level: debug
    format: pretty
  metrics_port: 9464
"#;

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.persistence.max_connections, 4);
        assert_eq!(config.messaging.stream_max_len, Some(100_000));
        assert_eq!(
            config.messaging.submission_worker().block,
            Duration::from_millis(500)
        );
        assert!(config.exchange.has_credentials());
        assert_eq!(config.exchange.retry.policy().max_retries, 2);

        let dispatcher = config.outbox.dispatcher();
        assert_eq!(dispatcher.lease_timeout, Duration::from_secs(30));
        assert_eq!(dispatcher.schedule.max_attempts, 4);
        assert_eq!(dispatcher.schedule.base_backoff, Duration::from_millis(250));

        assert_eq!(
            config.connector.poller.poller("binance").interval,
            Duration::from_secs(10)
        );
        assert_eq!(
            config.connector.poller.down_threshold(),
            Duration::from_secs(45)
        );
        assert!(!config.connector.stream.enabled);
        let supervisor = config
            .connector
            .stream
            .supervisor("binance", &config.connector.replay);
        assert_eq!(supervisor.replay_dedupe_window, Duration::from_secs(15));
        assert_eq!(supervisor.reconnect.max_backoff, Duration::from_secs(5));

        let catalog = config.instruments.catalog();
        assert_eq!(
            catalog.resolve("PEPEFDUSD"),
            Some(AssetPair::new("PEPE", "FDUSD"))
        );
        assert_eq!(catalog.active_instruments(), vec!["BTCUSDT".to_string()]);

        assert_eq!(config.observability.logging.level, "debug");
        assert_eq!(config.observability.logging.format, LogFormat::Pretty);
        assert_eq!(config.observability.metrics_port, Some(9464));
    }

    #[test]
    fn test_binance_config_uses_overrides() {
        let yaml = r#"
exchange:
  rest_base_url: "http://127.0.0.1:9999"
  ws_base_url: "ws://127.0.0.1:9998/ws"
"#;
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load: {e}"),
        };
        let binance = match config.exchange.binance(Duration::from_secs(60)) {
            Ok(b) => b,
            Err(e) => panic!("should build adapter config: {e}"),
        };
        assert_eq!(binance.rest_base_url(), "http://127.0.0.1:9999");
        assert_eq!(binance.ws_base_url(), "ws://127.0.0.1:9998/ws");
    }
}
