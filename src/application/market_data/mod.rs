//! Market Data Cache: hides the REST/stream duality behind one set of read operations. Trading
//! policy never depends on stream health — degraded instruments simply fall back to REST.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::domain::errors::GatewayError;
use crate::domain::ports::{ExchangeGateway, MarketEvent, MarketStream};
use crate::domain::trading::types::{Candle, OrderBook, TapeTrade};

const PRICE_TTL: Duration = Duration::from_secs(2);
const TRADE_TAPE_CAPACITY: usize = 500;
const STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const STREAM_MAX_CONSECUTIVE_FAILURES: u32 = 5;

struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

/// Caches REST reads with a short TTL and, when a stream is supplied, keeps a live trade tape and
/// price feed warm in the background. Candle history and order-book snapshots always hit the
/// gateway directly — only price and the recent trade tape benefit from caching here.
pub struct MarketDataCache {
    gateway: Arc<dyn ExchangeGateway>,
    stream: Option<Arc<dyn MarketStream>>,
    prices: RwLock<HashMap<String, CachedPrice>>,
    trade_tape: RwLock<HashMap<String, VecDeque<TapeTrade>>>,
    degraded: RwLock<HashSet<String>>,
}

impl MarketDataCache {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, stream: Option<Arc<dyn MarketStream>>) -> Self {
        Self {
            gateway,
            stream,
            prices: RwLock::new(HashMap::new()),
            trade_tape: RwLock::new(HashMap::new()),
            degraded: RwLock::new(HashSet::new()),
        }
    }

    pub async fn candles(&self, symbol: &str, interval: &str, lookback: usize) -> Result<Vec<Candle>, GatewayError> {
        self.gateway.historical_candles(symbol, interval, lookback).await
    }

    pub async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, GatewayError> {
        self.gateway.order_book(symbol, depth).await
    }

    /// Returns the cached price if fetched within [`PRICE_TTL`], otherwise refreshes from REST.
    pub async fn latest_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        if let Some(cached) = self.prices.read().await.get(symbol)
            && cached.fetched_at.elapsed() < PRICE_TTL
        {
            return Ok(cached.price);
        }

        let price = self.gateway.latest_price(symbol).await?;
        self.prices.write().await.insert(symbol.to_string(), CachedPrice { price, fetched_at: Instant::now() });
        Ok(price)
    }

    /// Recent trades accumulated from the live stream. Empty (not an error) when no stream is
    /// configured or the instrument hasn't produced any trades yet.
    pub async fn recent_trades(&self, symbol: &str) -> Vec<TapeTrade> {
        self.trade_tape.read().await.get(symbol).map(|tape| tape.iter().cloned().collect()).unwrap_or_default()
    }

    pub async fn is_degraded(&self, symbol: &str) -> bool {
        self.degraded.read().await.contains(symbol)
    }

    /// Subscribes to live streams for every instrument, each in its own reconnecting task. Runs
    /// until `stop` fires. An instrument that cannot establish a stream after repeated failures
    /// is marked degraded and left on REST-only for the rest of the process.
    pub async fn run_streams(self: Arc<Self>, symbols: Vec<String>, mut stop: watch::Receiver<bool>) {
        let Some(stream) = self.stream.clone() else {
            debug!("no market stream configured, running REST-only");
            return;
        };

        let mut consecutive_failures: HashMap<String, u32> = symbols.iter().map(|s| (s.clone(), 0)).collect();

        loop {
            if *stop.borrow() {
                return;
            }

            match stream.subscribe(symbols.clone()).await {
                Ok(mut receiver) => {
                    for symbol in &symbols {
                        consecutive_failures.insert(symbol.clone(), 0);
                        self.degraded.write().await.remove(symbol);
                    }
                    loop {
                        tokio::select! {
                            event = receiver.recv() => {
                                match event {
                                    Some(event) => self.apply_event(event).await,
                                    None => break,
                                }
                            }
                            _ = stop.changed() => {
                                if *stop.borrow() {
                                    return;
                                }
                            }
                        }
                    }
                    warn!("market stream closed, reconnecting");
                }
                Err(err) => {
                    warn!(error = %err, "market stream subscription failed");
                    for symbol in &symbols {
                        let failures = consecutive_failures.entry(symbol.clone()).or_insert(0);
                        *failures += 1;
                        if *failures >= STREAM_MAX_CONSECUTIVE_FAILURES {
                            self.degraded.write().await.insert(symbol.clone());
                            warn!(symbol, "instrument marked degraded, falling back to REST-only");
                        }
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(STREAM_RECONNECT_DELAY) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn apply_event(&self, event: MarketEvent) {
        match event {
            MarketEvent::Candle(_) | MarketEvent::Depth(_) => {
                // Candle/depth pushes are advisory freshness signals only; the authoritative read
                // path is always the REST snapshot taken at the top of each orchestrator cycle.
            }
            MarketEvent::Trade { symbol, trade } => {
                self.prices.write().await.insert(symbol.clone(), CachedPrice { price: trade.price, fetched_at: Instant::now() });
                let mut tape = self.trade_tape.write().await;
                let entry = tape.entry(symbol).or_insert_with(|| VecDeque::with_capacity(TRADE_TAPE_CAPACITY));
                entry.push_back(trade);
                if entry.len() > TRADE_TAPE_CAPACITY {
                    entry.pop_front();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::domain::ports::{AccountSnapshot, ExchangeOrderAck, OrderStatusReport};
    use crate::domain::trading::types::{OrderSide, OrderStatus, OrderType};

    struct CountingGateway {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ExchangeGateway for CountingGateway {
        async fn account_snapshot(&self) -> Result<AccountSnapshot, GatewayError> {
            unimplemented!()
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
            unimplemented!()
        }
        async fn order_status(&self, _symbol: &str, _exchange_order_id: &str) -> Result<OrderStatusReport, GatewayError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _symbol: &str, _exchange_order_id: &str) -> Result<(), GatewayError> {
            unimplemented!()
        }
        async fn order_book(&self, _symbol: &str, _depth: usize) -> Result<OrderBook, GatewayError> {
            unimplemented!()
        }
        async fn latest_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(dec!(42_000))
        }
        async fn historical_candles(&self, _symbol: &str, _interval: &str, _lookback: usize) -> Result<Vec<Candle>, GatewayError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn repeated_price_reads_within_ttl_hit_the_cache_once() {
        let gateway = Arc::new(CountingGateway { calls: std::sync::atomic::AtomicU32::new(0) });
        let cache = MarketDataCache::new(gateway.clone(), None);

        let first = cache.latest_price("BTCUSDT").await.unwrap();
        let second = cache.latest_price("BTCUSDT").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn applying_a_trade_event_updates_the_tape_and_price() {
        let gateway = Arc::new(CountingGateway { calls: std::sync::atomic::AtomicU32::new(0) });
        let cache = MarketDataCache::new(gateway, None);

        cache
            .apply_event(MarketEvent::Trade {
                symbol: "BTCUSDT".to_string(),
                trade: TapeTrade { timestamp: Utc::now(), price: dec!(43_000), quantity: dec!(1), buyer_is_maker: false },
            })
            .await;

        let trades = cache.recent_trades("BTCUSDT").await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(43_000));
    }

    #[tokio::test]
    async fn no_stream_configured_returns_immediately() {
        let gateway = Arc::new(CountingGateway { calls: std::sync::atomic::AtomicU32::new(0) });
        let cache = Arc::new(MarketDataCache::new(gateway, None));
        let (_tx, rx) = watch::channel(false);
        cache.run_streams(vec!["BTCUSDT".to_string()], rx).await;
    }
}
