//! Shared fixtures for integration tests: config builders and a scriptable mock gateway.
//! Not a test binary itself — `tests/common/` is excluded from Cargo's test autodiscovery.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spotcore::domain::errors::GatewayError;
use spotcore::domain::ports::{AccountSnapshot, ExchangeGateway, ExchangeOrderAck, OrderStatusReport};
use spotcore::domain::trading::types::{Candle, OrderBook, OrderSide, OrderStatus, OrderType};
use spotcore::config::{ExecutionConfig, RiskConfig};

pub fn execution_config() -> ExecutionConfig {
    ExecutionConfig {
        min_order_size_quote: dec!(10),
        max_order_size_quote: dec!(50_000),
        small_order_threshold_quote: dec!(1_000),
        large_order_threshold_quote: dec!(5_000),
        twap_chunk_target_quote: dec!(2_000),
        twap_default_num_chunks: 5,
        twap_interval_seconds: 0,
        twap_max_price_deviation_percent: 0.01,
        twap_min_chunk_value_quote: dec!(50),
        twap_max_spread_percent: 0.005,
        poll_interval_seconds: 0,
        poll_timeout_seconds: 2,
        poll_max_consecutive_errors: 3,
    }
}

pub fn risk_config() -> RiskConfig {
    RiskConfig {
        max_open_positions: 5,
        daily_loss_cap_percent: 0.05,
        drawdown_cap_percent: 0.10,
        symbol_exposure_cap_percent: 0.30,
        risk_per_trade_percent: 0.02,
        max_slippage_percent: 0.5,
        min_liquidity_quote: dec!(50_000),
        min_quote_reserve_percent: 0.10,
    }
}

pub fn deep_book(symbol: &str, best_bid: Decimal, best_ask: Decimal) -> OrderBook {
    OrderBook {
        symbol: symbol.to_string(),
        captured_at: Utc::now(),
        bids: vec![(best_bid, dec!(50)), (best_bid - dec!(1), dec!(50))],
        asks: vec![(best_ask, dec!(50)), (best_ask + dec!(1), dec!(50))],
    }
}

pub fn thin_book(symbol: &str, best_bid: Decimal, best_ask: Decimal) -> OrderBook {
    OrderBook {
        symbol: symbol.to_string(),
        captured_at: Utc::now(),
        bids: vec![(best_bid, dec!(0.001))],
        asks: vec![(best_ask, dec!(0.001))],
    }
}

/// A gateway whose responses are driven by small per-call-kind scripts rather than a single
/// fixed reply, so a test can walk a scenario through multiple order book / price lookups.
pub struct ScriptedGateway {
    pub account_balance: Decimal,
    pub fill_price: Decimal,
    pub fill_fees: Decimal,
    /// Returned in order on successive `latest_price` calls; the last entry repeats once
    /// exhausted.
    pub prices: Vec<Decimal>,
    /// Returned in order on successive `order_book` calls; the last entry repeats once
    /// exhausted.
    pub books: Vec<OrderBook>,
    price_calls: AtomicUsize,
    book_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(account_balance: Decimal, fill_price: Decimal) -> Self {
        Self {
            account_balance,
            fill_price,
            fill_fees: dec!(1),
            prices: vec![fill_price],
            books: vec![deep_book("BTC/USDT", fill_price - dec!(5), fill_price + dec!(5))],
            price_calls: AtomicUsize::new(0),
            book_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError> {
        let mut balances = std::collections::HashMap::new();
        balances.insert("USDT".to_string(), self.account_balance);
        Ok(AccountSnapshot { balances })
    }

    async fn place_order(
        &self,
        _symbol: &str,
        _side: OrderSide,
        _order_type: OrderType,
        _quantity: Decimal,
        _limit_price: Option<Decimal>,
        _client_order_id: &str,
    ) -> Result<ExchangeOrderAck, GatewayError> {
        Ok(ExchangeOrderAck { exchange_order_id: "x1".to_string(), submitted_at: Utc::now() })
    }

    async fn order_status(&self, _symbol: &str, _exchange_order_id: &str) -> Result<OrderStatusReport, GatewayError> {
        Ok(OrderStatusReport {
            status: OrderStatus::Filled,
            filled_quantity: dec!(0.1),
            average_fill_price: Some(self.fill_price),
            fees: self.fill_fees,
            fee_asset: None,
        })
    }

    async fn cancel_order(&self, _symbol: &str, _exchange_order_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn order_book(&self, symbol: &str, _depth: usize) -> Result<OrderBook, GatewayError> {
        let index = self.book_calls.fetch_add(1, Ordering::SeqCst);
        let book = self.books.get(index).or_else(|| self.books.last()).cloned();
        Ok(book.unwrap_or_else(|| deep_book(symbol, self.fill_price - dec!(5), self.fill_price + dec!(5))))
    }

    async fn latest_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
        let index = self.price_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prices.get(index).copied().or_else(|| self.prices.last().copied()).unwrap_or(self.fill_price))
    }

    async fn historical_candles(&self, symbol: &str, _interval: &str, lookback: usize) -> Result<Vec<Candle>, GatewayError> {
        Ok((0..lookback)
            .map(|i| Candle {
                symbol: symbol.to_string(),
                open_time: Utc::now(),
                open: self.fill_price,
                high: self.fill_price,
                low: self.fill_price,
                close: self.fill_price,
                volume: dec!(1),
                trade_count: 1 + i as u64,
            })
            .collect())
    }
}
