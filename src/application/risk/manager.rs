//! Risk Manager: the seven-step gate that stands between a `Signal` and a live order, plus the
//! sizing calculation that turns an approved signal into a concrete quantity.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::{ExecutionConfig, RiskConfig};
use crate::domain::errors::RiskRejection;
use crate::domain::market::{microstructure, order_book_metrics};
use crate::domain::trading::portfolio::{Position, PortfolioState};
use crate::domain::trading::types::{OrderBook, Signal};

/// Converts a config fraction (e.g. `0.05` for 5%) to `Decimal` for comparison against portfolio
/// ratios, which are computed in `Decimal` to stay exact.
fn percent_to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// The sizing a signal clears the gate with. `quantity` is what the Order Router and executors
/// should trade; everything else is carried through for logging and reconciliation.
#[derive(Debug, Clone)]
pub struct PositionSizing {
    pub quantity: Decimal,
    pub position_value: Decimal,
    pub risk_amount: Decimal,
    pub reward_risk_ratio: Decimal,
}

/// Owns the portfolio's process-local counters and the gate that decides whether a signal may
/// become a position. Exactly one instance should exist per running service.
pub struct RiskManager {
    risk: RiskConfig,
    execution: ExecutionConfig,
    portfolio: PortfolioState,
}

impl RiskManager {
    pub fn new(risk: RiskConfig, execution: ExecutionConfig) -> Self {
        Self { risk, execution, portfolio: PortfolioState::new() }
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn set_daily_start(&mut self, balance: Decimal) {
        self.portfolio.set_daily_start(balance);
    }

    pub fn update_daily_pnl(&mut self, current_balance: Decimal) {
        self.portfolio.update_daily_pnl(current_balance);
    }

    pub fn add_position(&mut self, position: Position) {
        self.portfolio.add_position(position);
    }

    pub fn remove_position(&mut self, id: &str) -> Option<Position> {
        self.portfolio.remove_position(id)
    }

    /// Runs the seven-step gate against `signal`. Returns the sizing to trade with on approval,
    /// or the first rejection reason encountered (checks run in the documented order, short
    /// circuiting on the first failure).
    pub fn validate(
        &self,
        signal: &Signal,
        account_balance: Decimal,
        book: &OrderBook,
    ) -> Result<PositionSizing, RiskRejection> {
        // 1. Microstructure re-validation.
        let micro = microstructure::analyze(book).ok_or_else(|| RiskRejection::PoorMicrostructure {
            symbol: signal.symbol.clone(),
        })?;
        if micro.spread_quality == microstructure::SpreadQuality::Poor
            || micro.liquidity_quality == order_book_metrics::LiquidityQuality::Poor
        {
            return Err(RiskRejection::PoorMicrostructure { symbol: signal.symbol.clone() });
        }

        // 2. Open position count below cap.
        let current = self.portfolio.position_count();
        if current >= self.risk.max_open_positions {
            return Err(RiskRejection::PositionCountAtCap { current, max: self.risk.max_open_positions });
        }

        // 3. Running daily loss.
        let daily_pnl_percent = self.portfolio.daily_pnl_percent();
        let daily_loss_cap = percent_to_decimal(self.risk.daily_loss_cap_percent);
        if daily_pnl_percent <= -daily_loss_cap {
            return Err(RiskRejection::DailyLossCapBreached {
                observed_pct: daily_pnl_percent.to_f64().unwrap_or(0.0),
                cap_pct: self.risk.daily_loss_cap_percent,
            });
        }

        // 4. Peak-to-current drawdown.
        let drawdown_percent = self.portfolio.drawdown_percent(account_balance);
        let drawdown_cap = percent_to_decimal(self.risk.drawdown_cap_percent);
        if drawdown_percent > drawdown_cap {
            return Err(RiskRejection::DrawdownCapBreached {
                observed_pct: drawdown_percent.to_f64().unwrap_or(0.0),
                cap_pct: self.risk.drawdown_cap_percent,
            });
        }

        // 5. Per-symbol exposure.
        let exposure_fraction =
            self.portfolio.symbol_exposure_fraction(&signal.symbol, signal.entry_price, account_balance);
        let exposure_cap = percent_to_decimal(self.risk.symbol_exposure_cap_percent);
        if exposure_fraction > exposure_cap {
            return Err(RiskRejection::SymbolExposureCapBreached {
                symbol: signal.symbol.clone(),
                observed_pct: exposure_fraction.to_f64().unwrap_or(0.0),
                cap_pct: self.risk.symbol_exposure_cap_percent,
            });
        }

        // 6. Position sizing, including the minimum quote reserve.
        let sizing = self.size_position(signal, account_balance)?;

        // 7. Final slippage re-validation at the computed size.
        let estimate = microstructure::estimate_slippage(book, sizing.position_value, signal.side)
            .ok_or_else(|| RiskRejection::PoorMicrostructure { symbol: signal.symbol.clone() })?;
        let max_slippage_percent = self.risk.max_slippage_percent * 100.0;
        let observed = estimate.slippage_percent.to_f64().unwrap_or(f64::MAX);
        if observed > max_slippage_percent {
            return Err(RiskRejection::SlippageExceeded {
                symbol: signal.symbol.clone(),
                estimated_pct: observed,
                max_pct: max_slippage_percent,
            });
        }

        Ok(sizing)
    }

    fn size_position(&self, signal: &Signal, account_balance: Decimal) -> Result<PositionSizing, RiskRejection> {
        let risk_per_trade = percent_to_decimal(self.risk.risk_per_trade_percent);
        let risk_amount = account_balance * risk_per_trade;
        let risk_per_unit = (signal.entry_price - signal.stop_loss).abs();
        if risk_per_unit <= Decimal::ZERO {
            return Err(RiskRejection::SizingInfeasible {
                symbol: signal.symbol.clone(),
                reason: "stop distance is zero".to_string(),
            });
        }

        let raw_quantity = risk_amount / risk_per_unit;
        let raw_value = raw_quantity * signal.entry_price;
        let clamped_value = raw_value.clamp(self.execution.min_order_size_quote, self.execution.max_order_size_quote);
        if raw_value < self.execution.min_order_size_quote && clamped_value > risk_amount {
            return Err(RiskRejection::SizingInfeasible {
                symbol: signal.symbol.clone(),
                reason: format!(
                    "minimum order size {} cannot be reached without exceeding the risk budget of {}",
                    self.execution.min_order_size_quote, risk_amount
                ),
            });
        }
        let quantity = clamped_value / signal.entry_price;

        let required_reserve = account_balance * percent_to_decimal(self.risk.min_quote_reserve_percent);
        let available_after = account_balance - clamped_value;
        if available_after < required_reserve {
            return Err(RiskRejection::QuoteReserveBreached {
                available: available_after.to_string(),
                required: required_reserve.to_string(),
            });
        }

        let reward_risk_ratio = (signal.take_profit - signal.entry_price).abs() / risk_per_unit;

        Ok(PositionSizing { quantity, position_value: clamped_value, risk_amount, reward_risk_ratio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::OrderSide;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn risk_config() -> RiskConfig {
        RiskConfig {
            max_open_positions: 3,
            daily_loss_cap_percent: 0.05,
            drawdown_cap_percent: 0.10,
            symbol_exposure_cap_percent: 0.30,
            risk_per_trade_percent: 0.02,
            max_slippage_percent: 0.5,
            min_liquidity_quote: dec!(50_000),
            min_quote_reserve_percent: 0.10,
        }
    }

    fn execution_config() -> ExecutionConfig {
        ExecutionConfig {
            min_order_size_quote: dec!(10),
            max_order_size_quote: dec!(50_000),
            small_order_threshold_quote: dec!(1_000),
            large_order_threshold_quote: dec!(5_000),
            twap_chunk_target_quote: dec!(2_000),
            twap_default_num_chunks: 5,
            twap_interval_seconds: 30,
            twap_max_price_deviation_percent: 0.01,
            twap_min_chunk_value_quote: dec!(50),
            twap_max_spread_percent: 0.005,
            poll_interval_seconds: 2,
            poll_timeout_seconds: 300,
            poll_max_consecutive_errors: 5,
        }
    }

    fn deep_book() -> OrderBook {
        OrderBook {
            symbol: "BTC/USDT".to_string(),
            captured_at: Utc::now(),
            bids: vec![(dec!(41_995), dec!(50))],
            asks: vec![(dec!(42_005), dec!(50))],
        }
    }

    fn buy_signal() -> Signal {
        Signal {
            strategy_name: "institutional_multi_factor".to_string(),
            symbol: "BTC/USDT".to_string(),
            side: OrderSide::Buy,
            entry_price: dec!(42_000),
            stop_loss: dec!(41_160),
            take_profit: dec!(43_680),
            confidence: 0.8,
            timestamp: Utc::now(),
            metadata: String::new(),
        }
    }

    #[test]
    fn approves_a_well_sized_signal_with_plenty_of_balance() {
        let manager = RiskManager::new(risk_config(), execution_config());
        let sizing = manager.validate(&buy_signal(), dec!(100_000), &deep_book()).unwrap();
        assert!(sizing.quantity > Decimal::ZERO);
        assert!(sizing.position_value >= execution_config().min_order_size_quote);
    }

    #[test]
    fn rejects_when_position_count_at_cap() {
        let mut manager = RiskManager::new(risk_config(), execution_config());
        for i in 0..3 {
            manager.add_position(Position {
                id: format!("p{i}"),
                symbol: "ETH/USDT".to_string(),
                side: OrderSide::Buy,
                entry_price: dec!(2000),
                quantity: dec!(1),
                stop_loss: None,
                take_profit: None,
                trailing_stop_percent: None,
                max_favourable_price: None,
                opened_at: Utc::now(),
            });
        }
        let result = manager.validate(&buy_signal(), dec!(100_000), &deep_book());
        assert!(matches!(result, Err(RiskRejection::PositionCountAtCap { .. })));
    }

    #[test]
    fn rejects_on_daily_loss_cap_breach() {
        let mut manager = RiskManager::new(risk_config(), execution_config());
        manager.set_daily_start(dec!(100_000));
        manager.update_daily_pnl(dec!(94_000));
        let result = manager.validate(&buy_signal(), dec!(94_000), &deep_book());
        assert!(matches!(result, Err(RiskRejection::DailyLossCapBreached { .. })));
    }

    #[test]
    fn rejects_poor_microstructure_regardless_of_balance() {
        let manager = RiskManager::new(risk_config(), execution_config());
        let thin_book = OrderBook {
            symbol: "BTC/USDT".to_string(),
            captured_at: Utc::now(),
            bids: vec![(dec!(41_000), dec!(0.001))],
            asks: vec![(dec!(43_000), dec!(0.001))],
        };
        let result = manager.validate(&buy_signal(), dec!(100_000), &thin_book);
        assert!(matches!(result, Err(RiskRejection::PoorMicrostructure { .. })));
    }
}
