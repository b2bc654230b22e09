use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::OrderSide;

/// `(id, instrument, side, entry_price, quantity, stop_loss?, take_profit?, trailing_stop_percent?,
/// max_favourable_price?, opened_at)`. Exactly-one-owner: the Risk Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing_stop_percent: Option<Decimal>,
    pub max_favourable_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => (current_price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - current_price) * self.quantity,
        }
    }

    pub fn unrealized_pnl_percent(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() || self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        let cost_basis = self.entry_price * self.quantity;
        self.unrealized_pnl(current_price) / cost_basis
    }

    pub fn notional(&self, current_price: Decimal) -> Decimal {
        self.quantity * current_price
    }

    /// Track the most favourable price seen and compute a tightened trailing stop.
    /// Only ever tightens; never loosens an existing stop.
    pub fn update_trailing_stop(&mut self, current_price: Decimal) {
        let Some(trailing_percent) = self.trailing_stop_percent else {
            return;
        };

        let improved = match self.side {
            OrderSide::Buy => self.max_favourable_price.is_none_or(|best| current_price > best),
            OrderSide::Sell => self.max_favourable_price.is_none_or(|best| current_price < best),
        };
        if improved {
            self.max_favourable_price = Some(current_price);
        }
        let best = self.max_favourable_price.unwrap_or(current_price);

        let candidate = match self.side {
            OrderSide::Buy => best * (Decimal::ONE - trailing_percent),
            OrderSide::Sell => best * (Decimal::ONE + trailing_percent),
        };

        let tightened = match (self.side, self.stop_loss) {
            (OrderSide::Buy, Some(existing)) => candidate > existing,
            (OrderSide::Sell, Some(existing)) => candidate < existing,
            (_, None) => true,
        };
        if tightened {
            self.stop_loss = Some(candidate);
        }
    }
}

/// Derived view maintained by the Risk Manager: `open_positions`, `daily_start_balance`,
/// `running_daily_pnl`, `peak_balance`. All counters are process-local and are re-seeded from
/// the exchange account snapshot on restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    pub open_positions: HashMap<String, Position>,
    pub daily_start_balance: Decimal,
    pub running_daily_pnl: Decimal,
    pub peak_balance: Decimal,
}

impl PortfolioState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_daily_start(&mut self, balance: Decimal) {
        self.daily_start_balance = balance;
        self.running_daily_pnl = Decimal::ZERO;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }

    pub fn update_daily_pnl(&mut self, current_balance: Decimal) {
        self.running_daily_pnl = current_balance - self.daily_start_balance;
        if current_balance > self.peak_balance {
            self.peak_balance = current_balance;
        }
    }

    pub fn daily_pnl_percent(&self) -> Decimal {
        if self.daily_start_balance.is_zero() {
            return Decimal::ZERO;
        }
        self.running_daily_pnl / self.daily_start_balance
    }

    pub fn drawdown_percent(&self, current_balance: Decimal) -> Decimal {
        if self.peak_balance.is_zero() {
            return Decimal::ZERO;
        }
        ((self.peak_balance - current_balance) / self.peak_balance).max(Decimal::ZERO)
    }

    pub fn add_position(&mut self, position: Position) {
        self.open_positions.insert(position.id.clone(), position);
    }

    pub fn remove_position(&mut self, id: &str) -> Option<Position> {
        self.open_positions.remove(id)
    }

    pub fn position_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn positions_for_symbol(&self, symbol: &str) -> Vec<&Position> {
        self.open_positions.values().filter(|p| p.symbol == symbol).collect()
    }

    /// Fraction of `account_balance` currently committed to `symbol`'s open exposure.
    pub fn symbol_exposure_fraction(&self, symbol: &str, current_price: Decimal, account_balance: Decimal) -> Decimal {
        if account_balance.is_zero() {
            return Decimal::ZERO;
        }
        let exposure: Decimal = self
            .positions_for_symbol(symbol)
            .iter()
            .map(|p| p.notional(current_price))
            .sum();
        exposure / account_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: OrderSide) -> Position {
        Position {
            id: "p1".into(),
            symbol: "BTC/USDT".into(),
            side,
            entry_price: dec!(42000),
            quantity: dec!(0.1),
            stop_loss: Some(dec!(41160)),
            take_profit: Some(dec!(42840)),
            trailing_stop_percent: None,
            max_favourable_price: None,
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn unrealized_pnl_long_and_short() {
        let long = position(OrderSide::Buy);
        assert_eq!(long.unrealized_pnl(dec!(43000)), dec!(100));

        let short = position(OrderSide::Sell);
        assert_eq!(short.unrealized_pnl(dec!(41000)), dec!(100));
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let mut pos = position(OrderSide::Buy);
        pos.trailing_stop_percent = Some(dec!(0.02));

        pos.update_trailing_stop(dec!(43000));
        let tightened = pos.stop_loss.unwrap();
        assert!(tightened > dec!(41160));

        // Price retreats: stop must not loosen.
        pos.update_trailing_stop(dec!(42500));
        assert_eq!(pos.stop_loss.unwrap(), tightened);
    }

    #[test]
    fn portfolio_daily_pnl_percent() {
        let mut state = PortfolioState::new();
        state.set_daily_start(dec!(10000));
        state.update_daily_pnl(dec!(9400));
        assert_eq!(state.daily_pnl_percent(), dec!(-0.06));
    }

    #[test]
    fn drawdown_percent_from_peak() {
        let mut state = PortfolioState::new();
        state.set_daily_start(dec!(10000));
        state.update_daily_pnl(dec!(11000));
        state.update_daily_pnl(dec!(9900));
        assert_eq!(state.drawdown_percent(dec!(9900)), dec!(0.1));
    }

    #[test]
    fn add_remove_position_tracks_count() {
        let mut state = PortfolioState::new();
        state.add_position(position(OrderSide::Buy));
        assert_eq!(state.position_count(), 1);
        state.remove_position("p1");
        assert_eq!(state.position_count(), 0);
    }
}
