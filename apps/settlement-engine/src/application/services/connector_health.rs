//! Shared connector health handle.
//!
//! The poller and the stream supervisor both write one
//! [`ConnectorHealthState`]; each change is persisted through the
//! [`ConnectorStateRepository`] so operators read it from the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::domain::connector::{ConnectorHealthState, ConnectorStateRepository};

/// Cloneable handle over one connector's health.
#[derive(Clone)]
pub struct ConnectorHealthHandle {
    state: Arc<RwLock<ConnectorHealthState>>,
    store: Arc<dyn ConnectorStateRepository>,
    down_threshold: Duration,
}

impl ConnectorHealthHandle {
    /// Fresh handle for `connector_name`.
    pub fn new(
        connector_name: &str,
        store: Arc<dyn ConnectorStateRepository>,
        down_threshold: Duration,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectorHealthState::new(
                connector_name,
                Utc::now(),
            ))),
            store,
            down_threshold,
        }
    }

    /// Handle seeded from the persisted row, if one exists.
    pub async fn restore(
        connector_name: &str,
        store: Arc<dyn ConnectorStateRepository>,
        down_threshold: Duration,
    ) -> Self {
        let handle = Self::new(connector_name, Arc::clone(&store), down_threshold);
        match store.find_health(connector_name).await {
            Ok(Some(persisted)) => *handle.state.write() = persisted,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(connector = connector_name, error = %err, "Could not load connector health");
            }
        }
        handle
    }

    /// Connector name.
    #[must_use]
    pub fn connector_name(&self) -> String {
        self.state.read().connector_name.clone()
    }

    /// Age after which a connector without a successful poll is DOWN.
    #[must_use]
    pub const fn down_threshold(&self) -> Duration {
        self.down_threshold
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectorHealthState {
        self.state.read().clone()
    }

    /// Mutate the state, then persist it. Persistence failures are logged.
    pub async fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ConnectorHealthState),
    {
        let snapshot = {
            let mut state = self.state.write();
            mutate(&mut state);
            state.clone()
        };
        if let Err(err) = self.store.upsert_health(&snapshot).await {
            tracing::warn!(
                connector = %snapshot.connector_name,
                error = %err,
                "Failed to persist connector health"
            );
        }
    }
}
