//! Binance spot REST adapter: the only component that signs requests or touches the exchange's
//! rate limit and circuit breaker state directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;

use crate::domain::errors::GatewayError;
use crate::domain::ports::{AccountSnapshot, ExchangeGateway, ExchangeOrderAck, OrderStatusReport};
use crate::domain::trading::types::{
    Candle, OrderBook, OrderSide, OrderStatus, OrderType, denormalize_crypto_symbol, normalize_crypto_symbol,
};
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerError, HttpClientFactory, RateLimiter, RateLimiterConfig};

const RECV_WINDOW_MS: i64 = 5_000;
const CLOCK_SKEW_CODE: i64 = -1021;

pub struct BinanceGateway {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<RateLimiter>,
}

impl BinanceGateway {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            api_key,
            api_secret,
            base_url,
            circuit_breaker: Arc::new(CircuitBreaker::new("BinanceGateway", 5, 3, Duration::from_secs(60))),
            rate_limiter: Arc::new(RateLimiter::new(RateLimiterConfig::default())),
        }
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Performs one signed request, re-syncing and retrying exactly once on a clock-skew
    /// rejection (`code == -1021`).
    async fn signed_request(
        &self,
        operation: &str,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<serde_json::Value, GatewayError> {
        self.rate_limiter.acquire(1, false).await?;

        for attempt in 0..2 {
            params.retain(|(k, _)| k != "timestamp" && k != "recvWindow" && k != "signature");
            params.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
            params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));

            let query: String = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let signature = self.sign(&query);
            let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

            let op = operation.to_string();
            let result = self
                .circuit_breaker
                .call(async {
                    let response = self
                        .client
                        .request(method.clone(), &url)
                        .header("X-MBX-APIKEY", &self.api_key)
                        .send()
                        .await
                        .map_err(|e| GatewayError::TransportTransient { operation: op.clone(), source: e.into() })?;

                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| GatewayError::TransportTransient { operation: op.clone(), source: e.into() })?;

                    if status.is_success() {
                        serde_json::from_str(&body)
                            .map_err(|e| GatewayError::TransportTransient { operation: op.clone(), source: e.into() })
                    } else {
                        let code = serde_json::from_str::<serde_json::Value>(&body)
                            .ok()
                            .and_then(|v| v.get("code").and_then(|c| c.as_i64()));
                        if code == Some(CLOCK_SKEW_CODE) {
                            Err(GatewayError::ClockSkew)
                        } else if status.is_server_error() {
                            Err(GatewayError::TransportTransient {
                                operation: op.clone(),
                                source: anyhow::anyhow!("server error {}: {}", status, body),
                            })
                        } else {
                            Err(GatewayError::TransportPermanent {
                                operation: op.clone(),
                                status: status.as_u16(),
                                body,
                            })
                        }
                    }
                })
                .await
                .map_err(unwrap_circuit_breaker);

            match result {
                Err(GatewayError::ClockSkew) if attempt == 0 => {
                    warn!(operation, "clock skew detected, re-syncing and retrying once");
                    continue;
                }
                other => return other,
            }
        }
        unreachable!("loop always returns on its second iteration")
    }
}

fn unwrap_circuit_breaker(err: CircuitBreakerError<GatewayError>) -> GatewayError {
    match err {
        CircuitBreakerError::Open(_) => GatewayError::CircuitOpen { operation: "binance".to_string() },
        CircuitBreakerError::Inner(inner) => inner,
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .flat_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                vec![c]
            } else {
                format!("%{:02X}", c as u32).chars().collect()
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
    status: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    #[serde(rename = "cummulativeQuoteQty", default)]
    cumulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<FillEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct FillEntry {
    price: String,
    qty: String,
    commission: String,
    #[serde(rename = "commissionAsset")]
    commission_asset: String,
}

fn parse_status(raw: &str) -> OrderStatus {
    match raw {
        "NEW" => OrderStatus::Submitted,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
        "EXPIRED" => OrderStatus::Expired,
        _ => OrderStatus::Rejected,
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError> {
        let value = self
            .signed_request("account_snapshot", reqwest::Method::GET, "/api/v3/account", vec![])
            .await?;
        let account: AccountResponse = serde_json::from_value(value)
            .map_err(|e| GatewayError::TransportTransient { operation: "account_snapshot".to_string(), source: e.into() })?;

        let mut balances = std::collections::HashMap::new();
        for entry in account.balances {
            let free = entry.free.parse::<Decimal>().unwrap_or(Decimal::ZERO);
            let locked = entry.locked.parse::<Decimal>().unwrap_or(Decimal::ZERO);
            let total = free + locked;
            if total > Decimal::ZERO {
                balances.insert(entry.asset, total);
            }
        }
        Ok(AccountSnapshot { balances })
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        client_order_id: &str,
    ) -> Result<ExchangeOrderAck, GatewayError> {
        self.rate_limiter.acquire(1, true).await?;

        let api_symbol = denormalize_crypto_symbol(symbol);
        let mut params = vec![
            ("symbol".to_string(), api_symbol),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), order_type.to_string()),
            ("quantity".to_string(), quantity.to_string()),
            ("newClientOrderId".to_string(), client_order_id.to_string()),
        ];
        if let (OrderType::Limit, Some(price)) = (order_type, limit_price) {
            params.push(("price".to_string(), price.to_string()));
            params.push(("timeInForce".to_string(), "GTC".to_string()));
        }

        let value = self.signed_request("place_order", reqwest::Method::POST, "/api/v3/order", params).await?;
        let order: OrderResponse = serde_json::from_value(value)
            .map_err(|e| GatewayError::TransportTransient { operation: "place_order".to_string(), source: e.into() })?;

        Ok(ExchangeOrderAck { exchange_order_id: order.order_id.to_string(), submitted_at: Utc::now() })
    }

    async fn order_status(&self, symbol: &str, exchange_order_id: &str) -> Result<OrderStatusReport, GatewayError> {
        let api_symbol = denormalize_crypto_symbol(symbol);
        let params = vec![
            ("symbol".to_string(), api_symbol),
            ("orderId".to_string(), exchange_order_id.to_string()),
        ];
        let value = self.signed_request("order_status", reqwest::Method::GET, "/api/v3/order", params).await?;
        let order: OrderResponse = serde_json::from_value(value)
            .map_err(|e| GatewayError::TransportTransient { operation: "order_status".to_string(), source: e.into() })?;

        let filled_quantity = order.executed_qty.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        let average_fill_price = if filled_quantity > Decimal::ZERO {
            order
                .cumulative_quote_qty
                .parse::<Decimal>()
                .ok()
                .map(|quote| quote / filled_quantity)
        } else {
            None
        };

        let mut fees = Decimal::ZERO;
        let mut fee_asset = None;
        for fill in &order.fills {
            fees += fill.commission.parse::<Decimal>().unwrap_or(Decimal::ZERO);
            fee_asset = Some(fill.commission_asset.clone());
        }

        Ok(OrderStatusReport {
            status: parse_status(&order.status),
            filled_quantity,
            average_fill_price,
            fees,
            fee_asset,
        })
    }

    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<(), GatewayError> {
        let api_symbol = denormalize_crypto_symbol(symbol);
        let params = vec![
            ("symbol".to_string(), api_symbol),
            ("orderId".to_string(), exchange_order_id.to_string()),
        ];
        self.signed_request("cancel_order", reqwest::Method::DELETE, "/api/v3/order", params).await?;
        Ok(())
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, GatewayError> {
        let api_symbol = denormalize_crypto_symbol(symbol);
        let limit = depth.clamp(5, 5000);
        let url = format!("{}/api/v3/depth?symbol={}&limit={}", self.base_url, api_symbol, limit);

        self.rate_limiter.acquire(5, false).await?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::TransportTransient { operation: "order_book".to_string(), source: e.into() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TransportPermanent { operation: "order_book".to_string(), status, body });
        }

        #[derive(Deserialize)]
        struct DepthResponse {
            bids: Vec<[String; 2]>,
            asks: Vec<[String; 2]>,
        }
        let depth_response: DepthResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::TransportTransient { operation: "order_book".to_string(), source: e.into() })?;

        let parse_level = |level: &[String; 2]| -> (Decimal, Decimal) {
            (
                level[0].parse().unwrap_or(Decimal::ZERO),
                level[1].parse().unwrap_or(Decimal::ZERO),
            )
        };

        Ok(OrderBook {
            symbol: symbol.to_string(),
            captured_at: Utc::now(),
            bids: depth_response.bids.iter().map(parse_level).collect(),
            asks: depth_response.asks.iter().map(parse_level).collect(),
        })
    }

    async fn latest_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let api_symbol = denormalize_crypto_symbol(symbol);
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, api_symbol);

        self.rate_limiter.acquire(1, false).await?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::TransportTransient { operation: "latest_price".to_string(), source: e.into() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TransportPermanent { operation: "latest_price".to_string(), status, body });
        }

        #[derive(Deserialize)]
        struct PriceTicker {
            price: String,
        }
        let ticker: PriceTicker = response
            .json()
            .await
            .map_err(|e| GatewayError::TransportTransient { operation: "latest_price".to_string(), source: e.into() })?;
        ticker
            .price
            .parse::<Decimal>()
            .map_err(|e| GatewayError::TransportTransient { operation: "latest_price".to_string(), source: e.into() })
    }

    async fn historical_candles(&self, symbol: &str, interval: &str, lookback: usize) -> Result<Vec<Candle>, GatewayError> {
        let api_symbol = denormalize_crypto_symbol(symbol);
        let limit = lookback.clamp(1, 1000);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, api_symbol, interval, limit
        );

        self.rate_limiter.acquire(1, false).await?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::TransportTransient { operation: "historical_candles".to_string(), source: e.into() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TransportPermanent { operation: "historical_candles".to_string(), status, body });
        }

        let raw: Vec<serde_json::Value> = response.json().await.map_err(|e| GatewayError::TransportTransient {
            operation: "historical_candles".to_string(),
            source: e.into(),
        })?;

        let candles = raw
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                if arr.len() < 8 {
                    return None;
                }
                let open_time_ms = arr[0].as_i64()?;
                Some(Candle {
                    symbol: symbol.to_string(),
                    open_time: chrono::DateTime::from_timestamp_millis(open_time_ms)?,
                    open: arr[1].as_str()?.parse().ok()?,
                    high: arr[2].as_str()?.parse().ok()?,
                    low: arr[3].as_str()?.parse().ok()?,
                    close: arr[4].as_str()?.parse().ok()?,
                    volume: arr[5].as_str()?.parse().ok()?,
                    trade_count: arr[8].as_u64().unwrap_or(0),
                })
            })
            .collect();

        Ok(candles)
    }
}
