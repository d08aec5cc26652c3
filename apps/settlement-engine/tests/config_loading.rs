//! Configuration file loading tests.

#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::time::Duration;

use settlement_engine::config::{ConfigError, MessagingBackend, PersistenceBackend, load_config};

#[test]
fn shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
    let config = tokio_test::assert_ok!(load_config(Some(path)));

    assert_eq!(config.exchange.name, "binance");
    assert_eq!(config.outbox.max_attempts, 10);
    assert_eq!(config.connector.poller.down_threshold(), Duration::from_secs(120));
    assert!(config.instruments.catalog().len() >= 2);
}

#[test]
fn memory_backends_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r"
persistence:
  backend: memory
messaging:
  backend: memory
exchange:
  api_key: key
  api_secret: secret
outbox:
  lease_timeout_secs: 30
"
    )
    .unwrap();

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.persistence.backend, PersistenceBackend::Memory);
    assert_eq!(config.messaging.backend, MessagingBackend::Memory);
    assert!(config.exchange.has_credentials());
    assert_eq!(
        config.outbox.dispatcher().lease_timeout,
        Duration::from_secs(30)
    );
}

#[test]
fn invalid_file_is_a_validation_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "outbox:\n  max_attempts: 0").unwrap();

    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = load_config(path.to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::ReadError { .. }));
}
