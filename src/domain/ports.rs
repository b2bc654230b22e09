//! Port traits the application layer depends on and infrastructure adapters implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::GatewayError;
use crate::domain::trading::types::{Candle, Order, OrderBook, OrderSide, OrderType, TapeTrade};

/// Result of submitting a new order: what the exchange assigned it.
#[derive(Debug, Clone)]
pub struct ExchangeOrderAck {
    pub exchange_order_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Result of a single status poll.
#[derive(Debug, Clone)]
pub struct OrderStatusReport {
    pub status: crate::domain::trading::types::OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fees: Decimal,
    pub fee_asset: Option<String>,
}

/// Account balances keyed by asset.
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub balances: std::collections::HashMap<String, Decimal>,
}

impl AccountSnapshot {
    pub fn quote_balance(&self, quote_asset: &str) -> Decimal {
        self.balances.get(quote_asset).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Authenticated exchange operations. The gateway is the only component allowed to construct
/// request signatures; implementations own rate limiting, retry, and the circuit breaker.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError>;

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        client_order_id: &str,
    ) -> Result<ExchangeOrderAck, GatewayError>;

    async fn order_status(&self, symbol: &str, exchange_order_id: &str) -> Result<OrderStatusReport, GatewayError>;

    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<(), GatewayError>;

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, GatewayError>;

    async fn latest_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    async fn historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError>;
}

/// A live update pushed from a stream subscription.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    Candle(Candle),
    Depth(OrderBook),
    Trade { symbol: String, trade: TapeTrade },
}

/// Per-(instrument, stream-kind) subscription manager. Implementations reconnect on drop with
/// backoff; the cache never blocks trading policy on stream health.
#[async_trait]
pub trait MarketStream: Send + Sync {
    async fn subscribe(&self, symbols: Vec<String>) -> Result<tokio::sync::mpsc::Receiver<MarketEvent>, GatewayError>;
}
