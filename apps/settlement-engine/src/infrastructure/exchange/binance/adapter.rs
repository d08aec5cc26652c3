//! Binance adapter implementing ExchangePort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;

use super::api_types::{BinanceOrderResponse, BinanceTradeResponse};
use super::config::{BinanceConfig, BinanceEnvironment};
use super::error::BinanceError;
use super::http_client::BinanceHttpClient;
use crate::application::ports::{
    ExchangeError, ExchangeOrder, ExchangePort, ExchangeTrade, OrderLookup, PlaceOrderRequest,
};
use crate::domain::order_lifecycle::OrderType;

const ORDER_PATH: &str = "/api/v3/order";
const OPEN_ORDERS_PATH: &str = "/api/v3/openOrders";
const MY_TRADES_PATH: &str = "/api/v3/myTrades";
const MAX_TRADES_PER_CALL: u32 = 1000;

/// Binance spot exchange adapter.
#[derive(Debug, Clone)]
pub struct BinanceExchangeAdapter {
    client: BinanceHttpClient,
    environment: BinanceEnvironment,
}

impl BinanceExchangeAdapter {
    /// Create a new Binance adapter.
    pub fn new(config: &BinanceConfig) -> Result<Self, BinanceError> {
        Ok(Self {
            client: BinanceHttpClient::new(config)?,
            environment: config.environment,
        })
    }

    /// Shared HTTP client (also used by the user data stream).
    #[must_use]
    pub const fn client(&self) -> &BinanceHttpClient {
        &self.client
    }

    /// Convert a place request to query parameters.
    fn order_params(request: &PlaceOrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", request.instrument.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.normalize().to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if request.order_type == OrderType::Limit {
            params.push(("timeInForce", "GTC".to_string()));
            if let Some(price) = request.limit_price {
                params.push(("price", price.normalize().to_string()));
            }
        }
        params
    }

    /// Identify an order by exchange id, else by client id.
    fn lookup_params(lookup: &OrderLookup) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let mut params = vec![("symbol", lookup.instrument.clone())];
        if let Some(id) = &lookup.exchange_order_id {
            params.push(("orderId", id.clone()));
        } else if let Some(id) = &lookup.client_order_id {
            params.push(("origClientOrderId", id.clone()));
        } else {
            return Err(ExchangeError::Rejected {
                code: None,
                message: "order lookup needs an exchange or client order id".to_string(),
            });
        }
        Ok(params)
    }

    async fn order_call(
        &self,
        method: Method,
        params: &[(&str, String)],
    ) -> Result<ExchangeOrder, ExchangeError> {
        let response: BinanceOrderResponse = self.client.signed(method, ORDER_PATH, params).await?;
        Ok(response.into_exchange_order()?)
    }
}

#[async_trait]
impl ExchangePort for BinanceExchangeAdapter {
    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<ExchangeOrder, ExchangeError> {
        if self.environment.is_production() {
            tracing::warn!(
                client_order_id = %request.client_order_id,
                instrument = %request.instrument,
                "Placing PRODUCTION order - this moves real funds"
            );
        }
        tracing::info!(
            client_order_id = %request.client_order_id,
            instrument = %request.instrument,
            side = %request.side,
            order_type = %request.order_type,
            quantity = %request.quantity,
            limit_price = ?request.limit_price,
            "Placing order on Binance"
        );

        let order = self
            .order_call(Method::POST, &Self::order_params(request))
            .await?;

        tracing::info!(
            client_order_id = %request.client_order_id,
            exchange_order_id = %order.exchange_order_id,
            status = %order.raw_status,
            "Order placed"
        );
        Ok(order)
    }

    async fn cancel_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError> {
        tracing::info!(
            instrument = %lookup.instrument,
            exchange_order_id = ?lookup.exchange_order_id,
            client_order_id = ?lookup.client_order_id,
            "Canceling order on Binance"
        );
        self.order_call(Method::DELETE, &Self::lookup_params(lookup)?)
            .await
    }

    async fn query_order(&self, lookup: &OrderLookup) -> Result<ExchangeOrder, ExchangeError> {
        self.order_call(Method::GET, &Self::lookup_params(lookup)?)
            .await
    }

    async fn open_orders(&self) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let response: Vec<BinanceOrderResponse> = self
            .client
            .signed(Method::GET, OPEN_ORDERS_PATH, &[])
            .await?;
        response
            .into_iter()
            .map(|order| order.into_exchange_order().map_err(ExchangeError::from))
            .collect()
    }

    async fn recent_trades(
        &self,
        instrument: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExchangeTrade>, ExchangeError> {
        let params = [
            ("symbol", instrument.to_string()),
            ("startTime", since.timestamp_millis().to_string()),
            ("limit", MAX_TRADES_PER_CALL.to_string()),
        ];
        let response: Vec<BinanceTradeResponse> = self
            .client
            .signed(Method::GET, MY_TRADES_PATH, &params)
            .await?;
        tracing::debug!(instrument, trades = response.len(), "Fetched recent trades");
        response
            .into_iter()
            .map(|trade| trade.into_exchange_trade().map_err(ExchangeError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_lifecycle::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> BinanceExchangeAdapter {
        let config = BinanceConfig::new(
            "key".to_string(),
            "secret".to_string(),
            BinanceEnvironment::Testnet,
        )
        .with_rest_base_url(server.uri());
        BinanceExchangeAdapter::new(&config).unwrap()
    }

    fn limit_buy() -> PlaceOrderRequest {
        PlaceOrderRequest {
            client_order_id: "ord-1".to_string(),
            instrument: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: dec!(0.0100),
            limit_price: Some(dec!(50000.00)),
        }
    }

    #[test]
    fn limit_params_include_price_and_time_in_force() {
        let params = BinanceExchangeAdapter::order_params(&limit_buy());
        assert!(params.contains(&("quantity", "0.01".to_string())));
        assert!(params.contains(&("price", "50000".to_string())));
        assert!(params.contains(&("timeInForce", "GTC".to_string())));
        assert!(params.contains(&("newClientOrderId", "ord-1".to_string())));
    }

    #[test]
    fn market_params_omit_price() {
        let request = PlaceOrderRequest {
            order_type: OrderType::Market,
            limit_price: None,
            ..limit_buy()
        };
        let params = BinanceExchangeAdapter::order_params(&request);
        assert!(params.iter().all(|(k, _)| *k != "price" && *k != "timeInForce"));
    }

    #[test]
    fn lookup_prefers_exchange_id() {
        let lookup = OrderLookup {
            instrument: "BTCUSDT".to_string(),
            exchange_order_id: Some("42".to_string()),
            client_order_id: Some("ord-1".to_string()),
        };
        let params = BinanceExchangeAdapter::lookup_params(&lookup).unwrap();
        assert!(params.contains(&("orderId", "42".to_string())));
        assert!(params.iter().all(|(k, _)| *k != "origClientOrderId"));
    }

    #[tokio::test]
    async fn place_order_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ORDER_PATH))
            .and(query_param("newClientOrderId", "ord-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "BTCUSDT",
                "orderId": 991,
                "clientOrderId": "ord-1",
                "transactTime": 1_700_000_000_000_i64,
                "price": "50000.00000000",
                "origQty": "0.01000000",
                "executedQty": "0.00000000",
                "status": "NEW",
                "type": "LIMIT",
                "side": "BUY"
            })))
            .mount(&server)
            .await;

        let order = adapter(&server).place_order(&limit_buy()).await.unwrap();
        assert_eq!(order.exchange_order_id, "991");
        assert_eq!(order.status, Some(OrderStatus::Acknowledged));
    }

    #[tokio::test]
    async fn insufficient_balance_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ORDER_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": -2010,
                "msg": "Account has insufficient balance for requested action."
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).place_order(&limit_buy()).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Rejected {
                code: Some(-2010),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(ORDER_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": -2011,
                "msg": "Unknown order sent."
            })))
            .mount(&server)
            .await;

        let lookup = OrderLookup {
            instrument: "BTCUSDT".to_string(),
            exchange_order_id: None,
            client_order_id: Some("ord-1".to_string()),
        };
        let err = adapter(&server).cancel_order(&lookup).await.unwrap_err();
        assert!(matches!(err, ExchangeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn recent_trades_sends_start_time() {
        let server = MockServer::start().await;
        let since = Utc::now();
        Mock::given(method("GET"))
            .and(path(MY_TRADES_PATH))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("startTime", since.timestamp_millis().to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "symbol": "BTCUSDT",
                "id": 7,
                "orderId": 991,
                "price": "50000",
                "qty": "0.01",
                "commission": "1",
                "commissionAsset": "USDT",
                "time": 1_700_000_000_000_i64,
                "isBuyer": true
            }])))
            .mount(&server)
            .await;

        let trades = adapter(&server)
            .recent_trades("BTCUSDT", since)
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_id, "7");
    }
}
