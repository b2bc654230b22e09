//! Cumulative volume delta: running buy/sell pressure from tape trades, and its divergence
//! against price as a reversal signal.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::trading::types::TapeTrade;

const DEFAULT_DIVERGENCE_LOOKBACK: usize = 20;
const DEFAULT_TREND_LOOKBACK: usize = 10;

/// Running cumulative volume delta built from a trade tape, aligned one-to-one with the trades
/// it was built from.
#[derive(Debug, Clone)]
pub struct CvdSeries {
    pub values: Vec<Decimal>,
}

impl CvdSeries {
    pub fn from_trades(trades: &[TapeTrade]) -> Self {
        let mut running = Decimal::ZERO;
        let values = trades
            .iter()
            .map(|t| {
                running += t.signed_volume();
                running
            })
            .collect();
        Self { values }
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.values.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvdTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Classifies the last `lookback` CVD readings: a 10% rise/fall from the start of the window
/// to the end is considered a directional trend.
pub fn trend(series: &CvdSeries, lookback: usize) -> CvdTrend {
    if series.values.len() < lookback {
        return CvdTrend::Neutral;
    }
    let window = &series.values[series.values.len() - lookback..];
    let (first, last) = (window[0], window[window.len() - 1]);
    if last > first * Decimal::new(11, 1) {
        CvdTrend::Bullish
    } else if last < first * Decimal::new(9, 1) {
        CvdTrend::Bearish
    } else {
        CvdTrend::Neutral
    }
}

pub fn trend_default(series: &CvdSeries) -> CvdTrend {
    trend(series, DEFAULT_TREND_LOOKBACK)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvdDivergence {
    Bullish,
    Bearish,
}

/// Detects divergence between a recent price close series and CVD over the same window:
/// price and CVD trending in opposite directions, each beyond half a standard deviation of
/// their own window, is treated as a reversal signal.
pub fn divergence(recent_closes: &[Decimal], series: &CvdSeries, lookback: usize) -> Option<CvdDivergence> {
    if recent_closes.len() < lookback || series.values.len() < lookback {
        return None;
    }
    let prices: Vec<f64> = recent_closes[recent_closes.len() - lookback..]
        .iter()
        .filter_map(|d| d.to_f64())
        .collect();
    let cvd: Vec<f64> = series.values[series.values.len() - lookback..]
        .iter()
        .filter_map(|d| d.to_f64())
        .collect();
    if prices.len() < 5 || cvd.len() < 5 {
        return None;
    }

    let price_trend = prices[prices.len() - 1] - prices[0];
    let cvd_trend = cvd[cvd.len() - 1] - cvd[0];
    let price_volatility = stdev(&prices);
    let cvd_volatility = stdev(&cvd);
    if price_volatility == 0.0 || cvd_volatility == 0.0 {
        return None;
    }

    let normalized_price = price_trend / price_volatility;
    let normalized_cvd = cvd_trend / cvd_volatility;

    if normalized_price < -0.5 && normalized_cvd > 0.5 {
        Some(CvdDivergence::Bullish)
    } else if normalized_price > 0.5 && normalized_cvd < -0.5 {
        Some(CvdDivergence::Bearish)
    } else {
        None
    }
}

pub fn divergence_default(recent_closes: &[Decimal], series: &CvdSeries) -> Option<CvdDivergence> {
    divergence(recent_closes, series, DEFAULT_DIVERGENCE_LOOKBACK)
}

fn stdev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, qty: Decimal, buyer_is_maker: bool) -> TapeTrade {
        TapeTrade { timestamp: Utc::now(), price, quantity: qty, buyer_is_maker }
    }

    #[test]
    fn taker_buys_push_cvd_up() {
        let trades = vec![
            trade(dec!(100), dec!(1), false),
            trade(dec!(100), dec!(1), false),
        ];
        let series = CvdSeries::from_trades(&trades);
        assert_eq!(series.latest(), Some(dec!(2)));
    }

    #[test]
    fn maker_buys_push_cvd_down() {
        let trades = vec![trade(dec!(100), dec!(1), true)];
        let series = CvdSeries::from_trades(&trades);
        assert_eq!(series.latest(), Some(dec!(-1)));
    }

    #[test]
    fn trend_requires_minimum_history() {
        let series = CvdSeries { values: vec![dec!(1), dec!(2)] };
        assert_eq!(trend_default(&series), CvdTrend::Neutral);
    }

    #[test]
    fn short_windows_never_diverge() {
        let closes = vec![dec!(100), dec!(101)];
        let series = CvdSeries { values: vec![dec!(1), dec!(2)] };
        assert!(divergence_default(&closes, &series).is_none());
    }
}
