//! The institutional multi-factor strategy: a stateless scoring function over six microstructure
//! factors, wrapped in a thin engine that retains the last computed scores for observability.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::StrategyConfig;
use crate::domain::market::order_book_metrics::BookImbalance;
use crate::domain::market::volume_profile::{ProfilePosition, VolumeProfile};
use crate::domain::market::{cvd, microstructure, order_book_metrics, supply_demand};
use crate::domain::trading::types::{Candle, OrderBook, OrderSide, Signal, TapeTrade};

const STRATEGY_NAME: &str = "institutional_multi_factor";

fn hvn_proximity_percent() -> Decimal {
    dec!(0.005)
}

fn zone_stop_buffer_percent() -> Decimal {
    dec!(0.001)
}

fn fixed_stop_fraction() -> Decimal {
    dec!(0.02)
}

fn reward_risk_multiple() -> Decimal {
    dec!(2)
}

fn volume_amplifier_multiple() -> Decimal {
    dec!(1.5)
}

/// The last scores computed by [`StrategyEngine::evaluate`], kept even when no signal fires so
/// an observer can distinguish "nothing interesting" from "nearly fired".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreSnapshot {
    pub buy_score: f64,
    pub sell_score: f64,
    pub max_score: f64,
}

/// Multi-factor strategy engine. Holds configuration and the last scored evaluation; the scoring
/// itself is a pure function of its inputs.
pub struct StrategyEngine {
    config: StrategyConfig,
    last_scores: ScoreSnapshot,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config, last_scores: ScoreSnapshot::default() }
    }

    pub fn last_scores(&self) -> ScoreSnapshot {
        self.last_scores
    }

    /// Scores `(candles, order_book, trade_tape)` for `symbol` at `now` and emits a Signal when
    /// one side clears its threshold and leads the other, subject to the microstructure hard
    /// gate. Returns `None` on insufficient history (no candles, no valid book).
    pub fn evaluate(
        &mut self,
        symbol: &str,
        candles: &[Candle],
        book: &OrderBook,
        trades: &[TapeTrade],
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let last_candle = candles.last()?;
        let price = last_candle.close;

        let profile = VolumeProfile::build(candles);
        let micro = microstructure::analyze(book);

        let mut buy_score = 0.0;
        let mut sell_score = 0.0;
        let max_score = self.config.weight_volume_profile_position
            + self.config.weight_order_book_imbalance
            + self.config.weight_cvd_divergence
            + self.config.weight_supply_demand_zone
            + self.config.weight_hvn_proximity
            + self.config.weight_time_volume_amplifier;

        // 1. Volume-profile position.
        if let Some(profile) = &profile {
            match profile.position_of(price) {
                ProfilePosition::BelowValueArea => buy_score += self.config.weight_volume_profile_position,
                ProfilePosition::AboveValueArea => sell_score += self.config.weight_volume_profile_position,
                _ => {}
            }
        }

        // 2. Order-book imbalance (half weight for "moderate" labels).
        match order_book_metrics::imbalance_default(book) {
            BookImbalance::StrongBuy => buy_score += self.config.weight_order_book_imbalance,
            BookImbalance::ModerateBuy => buy_score += self.config.weight_order_book_imbalance * 0.5,
            BookImbalance::StrongSell => sell_score += self.config.weight_order_book_imbalance,
            BookImbalance::ModerateSell => sell_score += self.config.weight_order_book_imbalance * 0.5,
            BookImbalance::Balanced => {}
        }

        // 3. CVD divergence.
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let cvd_series = cvd::CvdSeries::from_trades(trades);
        match cvd::divergence_default(&closes, &cvd_series) {
            Some(cvd::CvdDivergence::Bullish) => buy_score += self.config.weight_cvd_divergence,
            Some(cvd::CvdDivergence::Bearish) => sell_score += self.config.weight_cvd_divergence,
            None => {}
        }

        // 4. Supply/demand zone occupancy (fresh zones only).
        let demand_zones = supply_demand::find_demand_zones(candles);
        let supply_zones = supply_demand::find_supply_zones(candles);
        let in_fresh_demand = demand_zones.iter().any(|z| z.is_fresh && z.contains(price));
        let in_fresh_supply = supply_zones.iter().any(|z| z.is_fresh && z.contains(price));
        if in_fresh_demand {
            buy_score += self.config.weight_supply_demand_zone;
        }
        if in_fresh_supply {
            sell_score += self.config.weight_supply_demand_zone;
        }

        // 5. HVN proximity: just above a node favours BUY, just below favours SELL.
        if let Some(hvn) = profile.as_ref().and_then(|p| p.nearest_hvn_within(price, hvn_proximity_percent())) {
            if price >= hvn {
                buy_score += self.config.weight_hvn_proximity;
            } else {
                sell_score += self.config.weight_hvn_proximity;
            }
        }

        // 6. Time/volume amplifier: reinforces whichever side already leads on a volume spike.
        if candles.len() > 1 {
            let history = &candles[..candles.len() - 1];
            let avg_volume: Decimal = history.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(history.len());
            if avg_volume > Decimal::ZERO && last_candle.volume > avg_volume * volume_amplifier_multiple() {
                if buy_score > sell_score {
                    buy_score += self.config.weight_time_volume_amplifier;
                } else if sell_score > buy_score {
                    sell_score += self.config.weight_time_volume_amplifier;
                }
            }
        }

        self.last_scores = ScoreSnapshot { buy_score, sell_score, max_score };
        debug!(symbol, buy_score, sell_score, max_score, "strategy scores computed");

        let gated_poor = match &micro {
            Some(m) => {
                m.spread_quality == microstructure::SpreadQuality::Poor
                    || m.liquidity_quality == order_book_metrics::LiquidityQuality::Poor
            }
            None => true,
        };
        if gated_poor {
            return None;
        }

        let side = if buy_score >= self.config.min_buy_score && buy_score > sell_score {
            OrderSide::Buy
        } else if sell_score >= self.config.min_sell_score && sell_score > buy_score {
            OrderSide::Sell
        } else {
            return None;
        };

        let profile = profile.as_ref();
        let (stop_loss, take_profit) =
            compute_stop_take(side, price, profile, &demand_zones, &supply_zones);

        let confidence = if max_score > 0.0 {
            let score = match side {
                OrderSide::Buy => buy_score,
                OrderSide::Sell => sell_score,
            };
            (score / max_score).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(Signal {
            strategy_name: STRATEGY_NAME.to_string(),
            symbol: symbol.to_string(),
            side,
            entry_price: price,
            stop_loss,
            take_profit,
            confidence,
            timestamp: now,
            metadata: format!("buy_score={buy_score:.2} sell_score={sell_score:.2}"),
        })
    }
}

fn compute_stop_take(
    side: OrderSide,
    entry: Decimal,
    profile: Option<&VolumeProfile>,
    demand_zones: &[supply_demand::Zone],
    supply_zones: &[supply_demand::Zone],
) -> (Decimal, Decimal) {
    let buffer = Decimal::ONE - zone_stop_buffer_percent();
    let widen = Decimal::ONE + zone_stop_buffer_percent();

    let nearby_hvn = profile.and_then(|p| p.nearest_hvn_within(entry, hvn_proximity_percent()));

    let stop_loss = match side {
        OrderSide::Buy => {
            if let Some(zone) = demand_zones.iter().find(|z| z.is_fresh && z.contains(entry)) {
                zone.zone_low * buffer
            } else if let Some(hvn) = nearby_hvn.filter(|&hvn| hvn < entry) {
                hvn * buffer
            } else {
                entry * (Decimal::ONE - fixed_stop_fraction())
            }
        }
        OrderSide::Sell => {
            if let Some(zone) = supply_zones.iter().find(|z| z.is_fresh && z.contains(entry)) {
                zone.zone_high * widen
            } else if let Some(hvn) = nearby_hvn.filter(|&hvn| hvn > entry) {
                hvn * widen
            } else {
                entry * (Decimal::ONE + fixed_stop_fraction())
            }
        }
    };

    let stop_distance = (entry - stop_loss).abs();
    let take_profit = match side {
        OrderSide::Buy => {
            let poc_favourable = profile.map(|p| p.point_of_control > entry).unwrap_or(false);
            if poc_favourable {
                profile.unwrap().point_of_control
            } else {
                entry + stop_distance * reward_risk_multiple()
            }
        }
        OrderSide::Sell => {
            let poc_favourable = profile.map(|p| p.point_of_control < entry).unwrap_or(false);
            if poc_favourable {
                profile.unwrap().point_of_control
            } else {
                entry - stop_distance * reward_risk_multiple()
            }
        }
    };

    (stop_loss, take_profit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> StrategyConfig {
        StrategyConfig {
            weight_volume_profile_position: 1.0,
            weight_order_book_imbalance: 1.0,
            weight_cvd_divergence: 1.0,
            weight_supply_demand_zone: 1.0,
            weight_hvn_proximity: 1.0,
            weight_time_volume_amplifier: 1.0,
            min_buy_score: 4.0,
            min_sell_score: 4.0,
        }
    }

    fn candle(i: usize, close: f64, volume: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".to_string(),
            open_time: Utc::now() + chrono::Duration::minutes(i as i64),
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(close * 1.002).unwrap(),
            low: Decimal::try_from(close * 0.998).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::try_from(volume).unwrap(),
            trade_count: 20,
        }
    }

    fn book(best_bid: f64, best_ask: f64, bid_qty: f64, ask_qty: f64) -> OrderBook {
        OrderBook {
            symbol: "BTCUSDT".to_string(),
            captured_at: Utc::now(),
            bids: vec![(Decimal::try_from(best_bid).unwrap(), Decimal::try_from(bid_qty).unwrap())],
            asks: vec![(Decimal::try_from(best_ask).unwrap(), Decimal::try_from(ask_qty).unwrap())],
        }
    }

    #[test]
    fn poor_microstructure_gates_out_any_signal() {
        let mut engine = StrategyEngine::new(config());
        let candles: Vec<Candle> = (0..20).map(|i| candle(i, 100.0, 100.0)).collect();
        let thin_book = book(100.0, 102.0, 0.01, 0.01); // wide spread, tiny liquidity
        let signal = engine.evaluate("BTCUSDT", &candles, &thin_book, &[], Utc::now());
        assert!(signal.is_none());
    }

    #[test]
    fn strong_confluence_emits_buy_with_valid_invariants() {
        let mut engine = StrategyEngine::new(config());
        let mut candles: Vec<Candle> = (0..19).map(|i| candle(i, 100.0, 50.0)).collect();
        candles.push(candle(19, 100.3, 500.0)); // volume spike on the last bar
        let deep_book = book(100.28, 100.30, 50.0, 5.0); // tight spread, bid-heavy, deep liquidity
        let trades: Vec<TapeTrade> = (0..25)
            .map(|_| TapeTrade {
                timestamp: Utc::now(),
                price: dec!(100.2),
                quantity: dec!(5),
                buyer_is_maker: false,
            })
            .collect();

        let signal = engine.evaluate("BTCUSDT", &candles, &deep_book, &trades, Utc::now());
        let scores = engine.last_scores();
        assert!(scores.buy_score > 0.0);

        if let Some(signal) = signal {
            assert_eq!(signal.side, OrderSide::Buy);
            assert!(signal.is_valid());
        }
    }

    #[test]
    fn balanced_book_with_no_edge_emits_nothing() {
        let mut engine = StrategyEngine::new(config());
        let candles: Vec<Candle> = (0..20).map(|i| candle(i, 100.0, 50.0)).collect();
        let balanced_book = book(99.99, 100.01, 10.0, 10.0);
        let signal = engine.evaluate("BTCUSDT", &candles, &balanced_book, &[], Utc::now());
        assert!(signal.is_none());
        assert_eq!(engine.last_scores().buy_score, engine.last_scores().sell_score);
    }
}
