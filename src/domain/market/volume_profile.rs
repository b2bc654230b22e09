//! Volume profile: distribution of traded volume across price, built from recent candles.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::domain::trading::types::Candle;

const NUM_BINS: usize = 100;
const VALUE_AREA_PERCENT: f64 = 0.70;
const HVN_PERCENTILE: f64 = 0.90;
const LVN_PERCENTILE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bin {
    low: Decimal,
    high: Decimal,
    volume: Decimal,
}

impl Bin {
    fn mid(&self) -> Decimal {
        (self.low + self.high) / dec!(2)
    }
}

/// A volume-at-price distribution over a candle window. Point of control, value area, and
/// high/low volume nodes are computed once at construction and cached on the struct.
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    bins: Vec<Bin>,
    pub point_of_control: Decimal,
    pub value_area_high: Decimal,
    pub value_area_low: Decimal,
    pub high_volume_nodes: Vec<Decimal>,
    pub low_volume_nodes: Vec<Decimal>,
}

impl VolumeProfile {
    /// Builds a profile from a candle window. Returns `None` if the window is empty or the
    /// candles span zero price range (cannot be binned).
    pub fn build(candles: &[Candle]) -> Option<Self> {
        if candles.is_empty() {
            return None;
        }

        let lowest = candles.iter().map(|c| c.low).min()?;
        let highest = candles.iter().map(|c| c.high).max()?;
        if highest <= lowest {
            return None;
        }

        let bin_width = (highest - lowest) / Decimal::from(NUM_BINS);
        let mut bins: Vec<Bin> = (0..NUM_BINS)
            .map(|i| {
                let low = lowest + bin_width * Decimal::from(i);
                let high = low + bin_width;
                Bin { low, high, volume: Decimal::ZERO }
            })
            .collect();

        for candle in candles {
            let touched: Vec<usize> = bins
                .iter()
                .enumerate()
                .filter(|(_, b)| b.high >= candle.low && b.low <= candle.high)
                .map(|(i, _)| i)
                .collect();
            if touched.is_empty() {
                continue;
            }
            let share = candle.volume / Decimal::from(touched.len());
            for i in touched {
                bins[i].volume += share;
            }
        }

        let poc_index = bins
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.volume.cmp(&b.volume))
            .map(|(i, _)| i)?;
        let point_of_control = bins[poc_index].mid();

        let total_volume: Decimal = bins.iter().map(|b| b.volume).sum();
        let mut by_volume_desc: Vec<usize> = (0..bins.len()).collect();
        by_volume_desc.sort_by(|&a, &b| bins[b].volume.cmp(&bins[a].volume));

        let target = total_volume * Decimal::from_f64_retain(VALUE_AREA_PERCENT).unwrap_or(dec!(0.70));
        let mut accumulated = Decimal::ZERO;
        let mut included = Vec::new();
        for idx in by_volume_desc {
            if accumulated >= target && !included.is_empty() {
                break;
            }
            accumulated += bins[idx].volume;
            included.push(idx);
        }
        let value_area_high = included
            .iter()
            .map(|&i| bins[i].high)
            .max()
            .unwrap_or(point_of_control);
        let value_area_low = included
            .iter()
            .map(|&i| bins[i].low)
            .min()
            .unwrap_or(point_of_control);

        let mut nonzero_volumes: Vec<f64> = bins
            .iter()
            .filter(|b| b.volume > Decimal::ZERO)
            .map(|b| b.volume.to_f64().unwrap_or(0.0))
            .collect();
        nonzero_volumes.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let hvn_threshold = percentile(&nonzero_volumes, HVN_PERCENTILE);
        let lvn_threshold = percentile(&nonzero_volumes, LVN_PERCENTILE);

        let high_volume_nodes = bins
            .iter()
            .filter(|b| b.volume.to_f64().unwrap_or(0.0) >= hvn_threshold && b.volume > Decimal::ZERO)
            .map(|b| b.mid())
            .collect();
        let low_volume_nodes = bins
            .iter()
            .filter(|b| b.volume.to_f64().unwrap_or(0.0) <= lvn_threshold && b.volume > Decimal::ZERO)
            .map(|b| b.mid())
            .collect();

        Some(Self {
            bins,
            point_of_control,
            value_area_high,
            value_area_low,
            high_volume_nodes,
            low_volume_nodes,
        })
    }

    /// Where the given price sits relative to the value area and point of control.
    pub fn position_of(&self, price: Decimal) -> ProfilePosition {
        if price > self.value_area_high {
            ProfilePosition::AboveValueArea
        } else if price < self.value_area_low {
            ProfilePosition::BelowValueArea
        } else if (price - self.point_of_control).abs() <= self.bin_width() {
            ProfilePosition::AtPointOfControl
        } else {
            ProfilePosition::InsideValueArea
        }
    }

    /// The nearest high-volume node within `max_distance_percent` of `price`, if any.
    pub fn nearest_hvn_within(&self, price: Decimal, max_distance_percent: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }
        self.high_volume_nodes
            .iter()
            .copied()
            .filter(|&hvn| ((hvn - price).abs() / price) <= max_distance_percent)
            .min_by_key(|&hvn| (hvn - price).abs())
    }

    fn bin_width(&self) -> Decimal {
        self.bins.first().map(|b| b.high - b.low).unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePosition {
    AboveValueArea,
    AtPointOfControl,
    InsideValueArea,
    BelowValueArea,
}

fn percentile(sorted_ascending: &[f64], p: f64) -> f64 {
    if sorted_ascending.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted_ascending.len() - 1) as f64).round() as usize;
    sorted_ascending[rank.min(sorted_ascending.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(low: f64, high: f64, close: f64, volume: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".to_string(),
            open_time: Utc::now(),
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::try_from(volume).unwrap(),
            trade_count: 10,
        }
    }

    #[test]
    fn empty_window_yields_no_profile() {
        assert!(VolumeProfile::build(&[]).is_none());
    }

    #[test]
    fn poc_lands_in_heaviest_traded_band() {
        let candles = vec![
            candle(100.0, 101.0, 100.5, 10.0),
            candle(100.0, 101.0, 100.5, 500.0),
            candle(110.0, 111.0, 110.5, 5.0),
        ];
        let profile = VolumeProfile::build(&candles).unwrap();
        assert!(profile.point_of_control < Decimal::from(105));
    }

    #[test]
    fn value_area_bounds_contain_point_of_control() {
        let candles = vec![
            candle(100.0, 101.0, 100.5, 50.0),
            candle(102.0, 103.0, 102.5, 80.0),
            candle(104.0, 105.0, 104.5, 30.0),
        ];
        let profile = VolumeProfile::build(&candles).unwrap();
        assert!(profile.value_area_low <= profile.point_of_control);
        assert!(profile.value_area_high >= profile.point_of_control);
    }

    #[test]
    fn nearest_hvn_respects_max_distance() {
        let candles = vec![
            candle(100.0, 101.0, 100.5, 500.0),
            candle(200.0, 201.0, 200.5, 10.0),
        ];
        let profile = VolumeProfile::build(&candles).unwrap();
        let far = profile.nearest_hvn_within(Decimal::from(200), dec!(0.01));
        assert!(far.is_none());
    }
}
