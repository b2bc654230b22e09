//! Spread, liquidity, and slippage estimation over a single order book snapshot.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::market::order_book_metrics::{self, LiquidityQuality};
use crate::domain::trading::types::{OrderBook, OrderSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadQuality {
    Good,
    Moderate,
    Poor,
}

#[derive(Debug, Clone, Copy)]
pub struct MicrostructureMetrics {
    pub spread_absolute: Decimal,
    pub spread_percent: Decimal,
    pub spread_quality: SpreadQuality,
    pub liquidity_quote_value: Decimal,
    pub liquidity_quality: LiquidityQuality,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
}

/// Summarises spread and liquidity quality from a single book snapshot. Returns `None` for an
/// empty book (no bids or asks), which the caller should treat as unexecutable.
pub fn analyze(book: &OrderBook) -> Option<MicrostructureMetrics> {
    let (best_bid, _) = *book.bids.first()?;
    let (best_ask, _) = *book.asks.first()?;

    let spread_absolute = best_ask - best_bid;
    let spread_percent = if best_bid > Decimal::ZERO {
        spread_absolute / best_bid * dec!(100)
    } else {
        Decimal::ZERO
    };
    let mid_price = (best_bid + best_ask) / dec!(2);

    let spread_quality = if spread_percent < dec!(0.05) {
        SpreadQuality::Good
    } else if spread_percent < dec!(0.1) {
        SpreadQuality::Moderate
    } else {
        SpreadQuality::Poor
    };

    let liquidity_quote_value = order_book_metrics::liquidity_value_default(book);
    let liquidity_quality = order_book_metrics::assess_liquidity_quality(liquidity_quote_value);

    Some(MicrostructureMetrics {
        spread_absolute,
        spread_percent,
        spread_quality,
        liquidity_quote_value,
        liquidity_quality,
        best_bid,
        best_ask,
        mid_price,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct SlippageEstimate {
    pub expected_price: Decimal,
    pub best_price: Decimal,
    pub slippage_absolute: Decimal,
    pub slippage_percent: Decimal,
    pub filled_quantity: Decimal,
}

/// Walks the book consuming levels until `order_size_quote` is filled, estimating the average
/// execution price. An order larger than the visible book is charged a 10% worse-case penalty
/// on the unfilled remainder rather than treated as infeasible.
pub fn estimate_slippage(book: &OrderBook, order_size_quote: Decimal, side: OrderSide) -> Option<SlippageEstimate> {
    let levels: &[(Decimal, Decimal)] = match side {
        OrderSide::Buy => &book.asks,
        OrderSide::Sell => &book.bids,
    };
    let (best_price, _) = *levels.first()?;

    let mut remaining = order_size_quote;
    let mut total_cost = Decimal::ZERO;
    let mut filled_quantity = Decimal::ZERO;

    for &(price, quantity) in levels {
        let level_value = price * quantity;
        if remaining <= level_value {
            filled_quantity += remaining / price;
            total_cost += remaining;
            remaining = Decimal::ZERO;
            break;
        }
        filled_quantity += quantity;
        total_cost += level_value;
        remaining -= level_value;
    }

    if remaining > Decimal::ZERO {
        let avg_price = if filled_quantity > Decimal::ZERO {
            total_cost / filled_quantity
        } else {
            best_price
        };
        let worst_case_price = avg_price * dec!(1.1);
        total_cost += remaining * worst_case_price / best_price;
        filled_quantity += remaining / worst_case_price;
    }

    let expected_price = if filled_quantity > Decimal::ZERO {
        total_cost / filled_quantity
    } else {
        best_price
    };
    let slippage_absolute = expected_price - best_price;
    let slippage_percent = if best_price > Decimal::ZERO {
        slippage_absolute / best_price * dec!(100)
    } else {
        Decimal::ZERO
    };

    Some(SlippageEstimate {
        expected_price,
        best_price,
        slippage_absolute,
        slippage_percent,
        filled_quantity,
    })
}

/// Whether an order of this size can clear the book within `max_slippage_percent`.
pub fn is_executable(book: &OrderBook, order_size_quote: Decimal, side: OrderSide, max_slippage_percent: Decimal) -> bool {
    match estimate_slippage(book, order_size_quote, side) {
        Some(estimate) => estimate.slippage_percent <= max_slippage_percent,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderBook {
        OrderBook { symbol: "BTCUSDT".to_string(), captured_at: Utc::now(), bids, asks }
    }

    #[test]
    fn empty_book_yields_no_metrics() {
        assert!(analyze(&book(vec![], vec![])).is_none());
    }

    #[test]
    fn tight_spread_is_classified_good() {
        let b = book(vec![(dec!(100.00), dec!(1))], vec![(dec!(100.02), dec!(1))]);
        let metrics = analyze(&b).unwrap();
        assert_eq!(metrics.spread_quality, SpreadQuality::Good);
    }

    #[test]
    fn slippage_is_zero_when_order_fits_best_level() {
        let b = book(vec![(dec!(100), dec!(10))], vec![(dec!(101), dec!(10))]);
        let estimate = estimate_slippage(&b, dec!(500), OrderSide::Buy).unwrap();
        assert_eq!(estimate.slippage_absolute, Decimal::ZERO);
    }

    #[test]
    fn order_larger_than_book_is_still_estimated_with_penalty() {
        let b = book(vec![(dec!(100), dec!(1))], vec![(dec!(101), dec!(1))]);
        let estimate = estimate_slippage(&b, dec!(10_000), OrderSide::Buy).unwrap();
        assert!(estimate.expected_price > dec!(101));
    }

    #[test]
    fn executable_respects_max_slippage() {
        let b = book(vec![(dec!(100), dec!(1))], vec![(dec!(101), dec!(1))]);
        assert!(!is_executable(&b, dec!(10_000), OrderSide::Buy, dec!(0.5)));
    }
}
