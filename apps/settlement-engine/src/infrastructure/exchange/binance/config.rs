//! Binance adapter configuration.

use std::time::Duration;

/// Binance deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceEnvironment {
    /// Spot testnet (simulated funds).
    Testnet,
    /// Production spot.
    Production,
}

impl BinanceEnvironment {
    /// REST base URL.
    #[must_use]
    pub const fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://testnet.binance.vision",
            Self::Production => "https://api.binance.com",
        }
    }

    /// User data stream base URL.
    #[must_use]
    pub const fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Testnet => "wss://stream.testnet.binance.vision/ws",
            Self::Production => "wss://stream.binance.com:9443/ws",
        }
    }

    /// Check if orders move real funds.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Testnet => write!(f, "TESTNET"),
            Self::Production => write!(f, "PRODUCTION"),
        }
    }
}

impl std::str::FromStr for BinanceEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "production" | "live" => Ok(Self::Production),
            other => Err(format!("unknown binance environment: {other}")),
        }
    }
}

/// Configuration for the Binance adapter.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Deployment.
    pub environment: BinanceEnvironment,
    /// REST base URL override.
    pub rest_base_url: Option<String>,
    /// Stream base URL override.
    pub ws_base_url: Option<String>,
    /// Signed request validity window.
    pub recv_window: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Listen key keepalive period.
    pub listen_key_keepalive: Duration,
}

impl BinanceConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String, environment: BinanceEnvironment) -> Self {
        Self {
            api_key,
            api_secret,
            environment,
            rest_base_url: None,
            ws_base_url: None,
            recv_window: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            listen_key_keepalive: Duration::from_secs(30 * 60),
        }
    }

    /// Point REST calls at another host.
    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// Point the user data stream at another host.
    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = Some(url.into());
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the signed request validity window.
    #[must_use]
    pub const fn with_recv_window(mut self, recv_window: Duration) -> Self {
        self.recv_window = recv_window;
        self
    }

    /// Set the listen key keepalive period.
    #[must_use]
    pub const fn with_listen_key_keepalive(mut self, period: Duration) -> Self {
        self.listen_key_keepalive = period;
        self
    }

    /// Effective REST base URL.
    #[must_use]
    pub fn rest_base_url(&self) -> &str {
        self.rest_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.rest_base_url())
    }

    /// Effective stream base URL.
    #[must_use]
    pub fn ws_base_url(&self) -> &str {
        self.ws_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.ws_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testnet_urls() {
        let env = BinanceEnvironment::Testnet;
        assert!(env.rest_base_url().contains("testnet"));
        assert!(env.ws_base_url().starts_with("wss://"));
        assert!(!env.is_production());
    }

    #[test]
    fn overrides_win_over_environment() {
        let config = BinanceConfig::new(
            "key".to_string(),
            "secret".to_string(),
            BinanceEnvironment::Production,
        )
        .with_rest_base_url("http://127.0.0.1:9000")
        .with_ws_base_url("ws://127.0.0.1:9001/ws");
        assert_eq!(config.rest_base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.ws_base_url(), "ws://127.0.0.1:9001/ws");
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(
            "TESTNET".parse::<BinanceEnvironment>(),
            Ok(BinanceEnvironment::Testnet)
        );
        assert_eq!(
            "live".parse::<BinanceEnvironment>(),
            Ok(BinanceEnvironment::Production)
        );
        assert!("staging".parse::<BinanceEnvironment>().is_err());
    }

    #[test]
    fn defaults() {
        let config = BinanceConfig::new(
            "key".to_string(),
            "secret".to_string(),
            BinanceEnvironment::Testnet,
        );
        assert_eq!(config.recv_window, Duration::from_secs(5));
        assert_eq!(config.listen_key_keepalive, Duration::from_secs(1800));
    }
}
