//! Supply and demand zone detection: price bands where consolidation preceded a strong move.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::trading::types::Candle;

const MIN_CONSOLIDATION_BARS: usize = 5;
const MOVE_WINDOW_BARS: usize = 5;

fn min_move_percent() -> Decimal {
    dec!(2.0)
}

fn max_consolidation_range_percent() -> Decimal {
    dec!(1.0)
}

fn test_strength_decay() -> Decimal {
    dec!(0.8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Demand,
    Supply,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub zone_low: Decimal,
    pub zone_high: Decimal,
    pub zone_type: ZoneType,
    pub strength: Decimal,
    pub is_fresh: bool,
    pub test_count: u32,
}

impl Zone {
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.zone_low && price <= self.zone_high
    }

    /// Records that price has returned to the zone: marks it no longer fresh, counts the test,
    /// and decays its strength. Tested zones are weaker support/resistance than fresh ones.
    pub fn record_test(&mut self) {
        self.is_fresh = false;
        self.test_count += 1;
        self.strength *= test_strength_decay();
    }
}

/// Finds demand zones: tight consolidation followed by a rally of at least 2%.
pub fn find_demand_zones(candles: &[Candle]) -> Vec<Zone> {
    find_zones(candles, ZoneType::Demand)
}

/// Finds supply zones: tight consolidation followed by a drop of at least 2%.
pub fn find_supply_zones(candles: &[Candle]) -> Vec<Zone> {
    find_zones(candles, ZoneType::Supply)
}

fn find_zones(candles: &[Candle], zone_type: ZoneType) -> Vec<Zone> {
    if candles.len() <= MIN_CONSOLIDATION_BARS + MOVE_WINDOW_BARS {
        return Vec::new();
    }

    let mut zones = Vec::new();
    for i in MIN_CONSOLIDATION_BARS..(candles.len() - MOVE_WINDOW_BARS) {
        let consolidation = &candles[i - MIN_CONSOLIDATION_BARS..i];
        let consolidation_high = consolidation.iter().map(|c| c.high).max().unwrap();
        let consolidation_low = consolidation.iter().map(|c| c.low).min().unwrap();
        if consolidation_low <= Decimal::ZERO {
            continue;
        }
        let range_percent = (consolidation_high - consolidation_low) / consolidation_low * dec!(100);
        if range_percent > max_consolidation_range_percent() {
            continue;
        }

        let move_window = &candles[i..i + MOVE_WINDOW_BARS];
        let move_percent = match zone_type {
            ZoneType::Demand => {
                let move_high = move_window.iter().map(|c| c.high).max().unwrap();
                (move_high - consolidation_high) / consolidation_high * dec!(100)
            }
            ZoneType::Supply => {
                let move_low = move_window.iter().map(|c| c.low).min().unwrap();
                (consolidation_low - move_low) / consolidation_low * dec!(100)
            }
        };

        if move_percent >= min_move_percent() {
            zones.push(Zone {
                zone_low: consolidation_low,
                zone_high: consolidation_high,
                zone_type,
                strength: (move_percent / dec!(5.0)).min(Decimal::ONE),
                is_fresh: true,
                test_count: 0,
            });
        }
    }

    remove_overlapping(zones)
}

/// Keeps the strongest zone in each overlapping cluster, sorted strongest-first.
fn remove_overlapping(zones: Vec<Zone>) -> Vec<Zone> {
    let mut sorted = zones;
    sorted.sort_by(|a, b| b.strength.cmp(&a.strength));

    let mut kept: Vec<Zone> = Vec::new();
    for zone in sorted {
        let overlaps = kept
            .iter()
            .any(|k| zone.zone_low <= k.zone_high && zone.zone_high >= k.zone_low);
        if !overlaps {
            kept.push(zone);
        }
    }
    kept
}

/// Updates test counters for every zone that currently contains `current_price`.
pub fn update_zone_tests(zones: &mut [Zone], current_price: Decimal) {
    for zone in zones.iter_mut() {
        if zone.contains(current_price) {
            zone.record_test();
        }
    }
}
