//! Operations HTTP listener.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Where `/health` and `/api/v1/connectors/*` are served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Interface to bind; IPv6 literals are accepted without brackets.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl ServerConfig {
    /// Listener address built from `bind_address` and `http_port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.bind_address.trim();
        let candidate = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.http_port)
        } else {
            format!("{host}:{}", self.http_port)
        };
        candidate.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "server.bind_address '{}' is not an IP address",
                self.bind_address
            ))
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            bind_address: default_bind_address(),
        }
    }
}

const fn default_http_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
