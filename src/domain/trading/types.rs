use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// `(open_time, open, high, low, close, volume, trade_count)` with `low <= open,close <= high`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
}

impl Candle {
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

/// Descending-price bids, ascending-price asks. Both non-empty for a valid book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl OrderBook {
    pub fn is_valid(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|(p, _)| *p)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_bid()? + self.best_ask()?) / Decimal::TWO)
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }
}

/// Aggressor-classified tape print. `buyer_is_maker=true` => seller-initiated (negative CVD delta).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TapeTrade {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub buyer_is_maker: bool,
}

impl TapeTrade {
    /// Signed volume: positive when the aggressor was a buyer.
    pub fn signed_volume(&self) -> Decimal {
        if self.buyer_is_maker {
            -self.quantity
        } else {
            self.quantity
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Twap,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Twap => write!(f, "TWAP"),
        }
    }
}

/// `PENDING -> SUBMITTED -> {FILLED | PARTIALLY_FILLED -> {FILLED|CANCELLED|EXPIRED} | REJECTED | CANCELLED | EXPIRED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Immutable value object emitted by the Strategy Engine.
///
/// Invariant: for BUY, `stop_loss < entry_price < take_profit`; mirrored for SELL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_name: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: String,
}

impl Signal {
    pub fn is_valid(&self) -> bool {
        match self.side {
            OrderSide::Buy => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            OrderSide::Sell => self.stop_loss > self.entry_price && self.entry_price > self.take_profit,
        }
    }
}

/// Mutable record owned by Order Lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub requested_quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fees: Decimal,
    pub exchange_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub metadata: String,
}

impl Order {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        requested_quantity: Decimal,
        limit_price: Option<Decimal>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            order_type,
            requested_quantity,
            limit_price,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            fees: Decimal::ZERO,
            exchange_order_id: None,
            created_at: Utc::now(),
            submitted_at: None,
            filled_at: None,
            metadata: metadata.into(),
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        (self.requested_quantity - self.filled_quantity).max(Decimal::ZERO)
    }
}

/// Reason a position or order was closed/stopped, used across monitor/emergency/twap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    MaxAge,
    Adverse,
    Emergency,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ===== Symbol normalization =====

/// Supported quote currencies for crypto pairs, ordered by priority (longest first to prefer USDT over USD).
const CRYPTO_QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "TUSD", "USD", "EUR", "GBP", "BTC", "ETH"];

/// Normalizes an exchange-wire symbol (e.g. "BTCUSDT") to application format ("BTC/USDT").
pub fn normalize_crypto_symbol(symbol: &str) -> Result<String, String> {
    if symbol.contains('/') {
        return Ok(symbol.to_string());
    }
    if symbol.is_empty() {
        return Err("Cannot normalize empty symbol".to_string());
    }
    for quote in CRYPTO_QUOTE_CURRENCIES {
        if symbol.ends_with(quote) && symbol.len() > quote.len() {
            let base = &symbol[..symbol.len() - quote.len()];
            if !base.is_empty() && base.chars().all(|c| c.is_ascii_uppercase()) {
                return Ok(format!("{}/{}", base, quote));
            }
        }
    }
    Err(format!(
        "Cannot normalize crypto symbol: '{}' - no recognized quote currency",
        symbol
    ))
}

/// Denormalizes "BTC/USDT" back to the exchange-wire "BTCUSDT" form.
pub fn denormalize_crypto_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_denormalize_roundtrip() {
        for symbol in ["BTCUSD", "ETHUSDT", "AVAXUSD", "LINKEUR"] {
            let normalized = normalize_crypto_symbol(symbol).unwrap();
            assert_eq!(denormalize_crypto_symbol(&normalized), symbol);
        }
    }

    #[test]
    fn normalize_prefers_longer_quote() {
        assert_eq!(normalize_crypto_symbol("BTCUSDT").unwrap(), "BTC/USDT");
    }

    #[test]
    fn normalize_rejects_unknown_quote() {
        assert!(normalize_crypto_symbol("GOOGLE").is_err());
        assert!(normalize_crypto_symbol("").is_err());
    }

    #[test]
    fn normalize_rejects_lowercase() {
        assert!(normalize_crypto_symbol("btcusd").is_err());
    }

    #[test]
    fn candle_validity() {
        let candle = Candle {
            symbol: "BTC/USDT".into(),
            open_time: Utc::now(),
            open: dec!(100),
            high: dec!(105),
            low: dec!(95),
            close: dec!(102),
            volume: dec!(10),
            trade_count: 5,
        };
        assert!(candle.is_valid());
    }

    #[test]
    fn signal_validity_buy_and_sell() {
        let buy = Signal {
            strategy_name: "multi_factor".into(),
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            entry_price: dec!(100),
            stop_loss: dec!(98),
            take_profit: dec!(104),
            confidence: 0.8,
            timestamp: Utc::now(),
            metadata: String::new(),
        };
        assert!(buy.is_valid());

        let sell = Signal { side: OrderSide::Sell, stop_loss: dec!(102), take_profit: dec!(96), ..buy };
        assert!(sell.is_valid());
    }

    #[test]
    fn order_remaining_quantity_tracks_fills() {
        let mut order = Order::new("BTC/USDT", OrderSide::Buy, OrderType::Market, dec!(1), None, "");
        order.filled_quantity = dec!(0.4);
        assert_eq!(order.remaining_quantity(), dec!(0.6));
    }

    #[test]
    fn tape_trade_signed_volume() {
        let buy_aggressor = TapeTrade { timestamp: Utc::now(), price: dec!(100), quantity: dec!(1), buyer_is_maker: false };
        assert_eq!(buy_aggressor.signed_volume(), dec!(1));
        let sell_aggressor = TapeTrade { buyer_is_maker: true, ..buy_aggressor };
        assert_eq!(sell_aggressor.signed_volume(), dec!(-1));
    }
}
