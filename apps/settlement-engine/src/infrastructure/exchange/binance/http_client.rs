//! Signed HTTP client for the Binance REST API.
//!
//! One call is one request: rate-limit retries belong to the application's
//! retry executor, which sees the `Retry-After` hint through
//! [`BinanceError::RateLimited`].

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::api_types::BinanceErrorResponse;
use super::config::BinanceConfig;
use super::error::BinanceError;
use super::signing::RequestSigner;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HTTP client for Binance with request signing.
#[derive(Debug, Clone)]
pub struct BinanceHttpClient {
    client: Client,
    api_key: String,
    signer: RequestSigner,
    base_url: String,
    recv_window_ms: u128,
}

impl BinanceHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &BinanceConfig) -> Result<Self, BinanceError> {
        if config.api_key.is_empty() {
            return Err(BinanceError::MissingCredentials);
        }
        let signer = RequestSigner::new(config.api_secret.clone())?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BinanceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            signer,
            base_url: config.rest_base_url().trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window.as_millis(),
        })
    }

    /// Signed request (`USER_DATA` / `TRADE` endpoints).
    ///
    /// `timestamp` and `recvWindow` are appended, then the whole query
    /// string is signed.
    pub async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        let mut url = self.url(path)?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("recvWindow", &self.recv_window_ms.to_string())
            .append_pair("timestamp", &Utc::now().timestamp_millis().to_string());
        let signature = self.signer.sign(url.query().unwrap_or_default())?;
        url.query_pairs_mut().append_pair("signature", &signature);
        self.send(method, url).await
    }

    /// Request authenticated by API key only (`USER_STREAM` endpoints).
    pub async fn keyed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        let mut url = self.url(path)?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        self.send(method, url).await
    }

    fn url(&self, path: &str) -> Result<Url, BinanceError> {
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| BinanceError::InvalidUrl(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T, BinanceError> {
        let path = url.path().to_string();
        let response = self
            .client
            .request(method.clone(), url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| BinanceError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| BinanceError::Http(e.to_string()))?;
            let body = if text.trim().is_empty() { "null" } else { &text };
            return serde_json::from_str(body).map_err(|e| BinanceError::JsonParse(e.to_string()));
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let error_body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<BinanceErrorResponse>(&error_body) {
            Ok(err) => (Some(err.code), err.msg),
            Err(_) => (None, error_body),
        };

        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            code = ?code,
            message = %message,
            "Binance request failed"
        );

        if is_rate_limit_status(status) {
            return Err(BinanceError::RateLimited {
                status: status.as_u16(),
                retry_after,
                message,
            });
        }
        Err(BinanceError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// 429 on weight overrun; 418 once the IP is auto-banned.
const fn is_rate_limit_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 418 | 429)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exchange::binance::BinanceEnvironment;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BinanceHttpClient {
        let config = BinanceConfig::new(
            "api-key".to_string(),
            "api-secret".to_string(),
            BinanceEnvironment::Testnet,
        )
        .with_rest_base_url(server.uri());
        BinanceHttpClient::new(&config).unwrap()
    }

    #[test]
    fn rate_limit_statuses() {
        assert!(is_rate_limit_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_rate_limit_status(StatusCode::IM_A_TEAPOT));
        assert!(!is_rate_limit_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn missing_key_is_refused() {
        let config = BinanceConfig::new(
            String::new(),
            "secret".to_string(),
            BinanceEnvironment::Testnet,
        );
        assert!(matches!(
            BinanceHttpClient::new(&config),
            Err(BinanceError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn signed_request_carries_key_and_valid_signature() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/openOrders"))
            .and(header("X-MBX-APIKEY", "api-key"))
            .and(query_param("recvWindow", "5000"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let orders: Vec<serde_json::Value> = client(&server)
            .signed(Method::GET, "/api/v3/openOrders", &[])
            .await
            .unwrap();
        assert!(orders.is_empty());

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap().to_string();
        let (unsigned, signature) = query.rsplit_once("&signature=").unwrap();
        let expected = RequestSigner::new("api-secret").unwrap().sign(unsigned).unwrap();
        assert_eq!(signature, expected);
        assert!(unsigned.contains("timestamp="));
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/order"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "3")
                    .set_body_string(r#"{"code":-1003,"msg":"Too much request weight used"}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .signed::<serde_json::Value>(
                Method::POST,
                "/api/v3/order",
                &[("symbol", "BTCUSDT".to_string())],
            )
            .await
            .unwrap_err();
        match err {
            BinanceError::RateLimited {
                status,
                retry_after,
                ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_body_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/order"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"code":-2013,"msg":"Order does not exist."}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .signed::<serde_json::Value>(Method::GET, "/api/v3/order", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BinanceError::Api {
                status: 400,
                code: Some(-2013),
                ..
            }
        ));
    }
}
