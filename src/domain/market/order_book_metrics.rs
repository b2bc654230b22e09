//! Order book depth analysis: imbalance, wall detection, and liquidity quality.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::trading::types::OrderBook;

const DEFAULT_IMBALANCE_DEPTH: usize = 10;
const WALL_DEPTH: usize = 50;
const LIQUIDITY_DEPTH: usize = 20;

fn wall_threshold_multiplier() -> Decimal {
    dec!(3.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookImbalance {
    StrongBuy,
    ModerateBuy,
    Balanced,
    ModerateSell,
    StrongSell,
}

/// Ratio of bid to ask volume over the top `depth` levels on each side, classified into the
/// same five buckets the order flow analysis uses elsewhere.
pub fn imbalance(book: &OrderBook, depth: usize) -> BookImbalance {
    let bid_volume: Decimal = book.bids.iter().take(depth).map(|(_, qty)| *qty).sum();
    let ask_volume: Decimal = book.asks.iter().take(depth).map(|(_, qty)| *qty).sum();

    if ask_volume <= Decimal::ZERO {
        return BookImbalance::StrongBuy;
    }
    let ratio = bid_volume / ask_volume;

    if ratio > dec!(1.5) {
        BookImbalance::StrongBuy
    } else if ratio > dec!(1.2) {
        BookImbalance::ModerateBuy
    } else if ratio < dec!(0.67) {
        BookImbalance::StrongSell
    } else if ratio < dec!(0.83) {
        BookImbalance::ModerateSell
    } else {
        BookImbalance::Balanced
    }
}

pub fn imbalance_default(book: &OrderBook) -> BookImbalance {
    imbalance(book, DEFAULT_IMBALANCE_DEPTH)
}

/// A single price level whose size is far above the surrounding average — a likely resting
/// institutional order.
#[derive(Debug, Clone, Copy)]
pub struct Wall {
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: crate::domain::trading::types::OrderSide,
}

/// Detects abnormally large resting levels across the top [`WALL_DEPTH`] levels of each side.
/// A level qualifies when its size exceeds `WALL_THRESHOLD_MULTIPLIER` times the average size
/// over the scanned levels.
pub fn detect_walls(book: &OrderBook) -> Vec<Wall> {
    let mut walls = Vec::new();
    walls.extend(side_walls(&book.bids, crate::domain::trading::types::OrderSide::Buy));
    walls.extend(side_walls(&book.asks, crate::domain::trading::types::OrderSide::Sell));
    walls
}

fn side_walls(
    levels: &[(Decimal, Decimal)],
    side: crate::domain::trading::types::OrderSide,
) -> Vec<Wall> {
    let scanned: Vec<&(Decimal, Decimal)> = levels.iter().take(WALL_DEPTH).collect();
    if scanned.is_empty() {
        return Vec::new();
    }
    let total: Decimal = scanned.iter().map(|(_, qty)| *qty).sum();
    let average = total / Decimal::from(scanned.len());
    if average <= Decimal::ZERO {
        return Vec::new();
    }
    scanned
        .into_iter()
        .filter(|(_, qty)| *qty > average * wall_threshold_multiplier())
        .map(|(price, qty)| Wall { price: *price, quantity: *qty, side })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityQuality {
    Good,
    Moderate,
    Poor,
}

/// Total quote-currency value resting within `depth` levels on both sides.
pub fn liquidity_value(book: &OrderBook, depth: usize) -> Decimal {
    let bid_value: Decimal = book.bids.iter().take(depth).map(|(p, q)| p * q).sum();
    let ask_value: Decimal = book.asks.iter().take(depth).map(|(p, q)| p * q).sum();
    bid_value + ask_value
}

pub fn liquidity_value_default(book: &OrderBook) -> Decimal {
    liquidity_value(book, LIQUIDITY_DEPTH)
}

pub fn assess_liquidity_quality(liquidity_quote_value: Decimal) -> LiquidityQuality {
    if liquidity_quote_value >= dec!(100_000) {
        LiquidityQuality::Good
    } else if liquidity_quote_value >= dec!(50_000) {
        LiquidityQuality::Moderate
    } else {
        LiquidityQuality::Poor
    }
}
