//! Position Monitor: a background task that walks open positions every `check_interval`,
//! closing any that hit their stop-loss, take-profit, max age, or adverse microstructure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, warn};

use crate::application::execution::lifecycle::OrderLifecycle;
use crate::application::risk::RiskManager;
use crate::domain::market::{microstructure, order_book_metrics};
use crate::domain::ports::ExchangeGateway;
use crate::domain::repositories::{ClosedTrade, TradeRepository};
use crate::domain::trading::portfolio::Position;
use crate::domain::trading::types::{CloseReason, OrderSide};

fn default_adverse_spread_percent() -> Decimal {
    dec!(0.1)
}

fn default_adverse_min_liquidity_quote() -> Decimal {
    dec!(50_000)
}

/// Tunables for the monitor loop. Not part of the typed `Config` aggregate — these are operating
/// parameters for a single in-process task, not externally validated startup configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub max_position_age: Option<Duration>,
    pub adverse_spread_percent: Decimal,
    pub adverse_min_liquidity_quote: Decimal,
    pub max_consecutive_loop_failures: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            max_position_age: None,
            adverse_spread_percent: default_adverse_spread_percent(),
            adverse_min_liquidity_quote: default_adverse_min_liquidity_quote(),
            max_consecutive_loop_failures: 5,
        }
    }
}

pub struct PositionMonitor {
    gateway: Arc<dyn ExchangeGateway>,
    lifecycle: Arc<OrderLifecycle>,
    risk: Arc<RwLock<RiskManager>>,
    repository: Option<Arc<dyn TradeRepository>>,
    settings: MonitorSettings,
}

impl PositionMonitor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        lifecycle: Arc<OrderLifecycle>,
        risk: Arc<RwLock<RiskManager>>,
        repository: Option<Arc<dyn TradeRepository>>,
        settings: MonitorSettings,
    ) -> Self {
        Self { gateway, lifecycle, risk, repository, settings }
    }

    /// Runs until `stop` is signalled. A single position's error never aborts the loop; only
    /// `max_consecutive_loop_failures` whole-tick failures in a row do.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.check_interval);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(()) => consecutive_failures = 0,
                        Err(err) => {
                            consecutive_failures += 1;
                            error!(error = %err, consecutive_failures, "position monitor tick failed");
                            if consecutive_failures >= self.settings.max_consecutive_loop_failures {
                                error!("position monitor stopping after too many consecutive failures");
                                return;
                            }
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        debug!("position monitor received stop signal");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let positions: Vec<Position> = self.risk.read().await.portfolio().open_positions.values().cloned().collect();

        for position in positions {
            let current_price = match self.gateway.latest_price(&position.symbol).await {
                Ok(price) => price,
                Err(err) => {
                    warn!(position_id = %position.id, error = %err, "skipping position this tick: price fetch failed");
                    continue;
                }
            };

            if let Some(reason) = self.evaluate(&position, current_price).await {
                self.close(&position, reason).await;
            }
        }

        Ok(())
    }

    /// Returns the close reason, if any, that `position` has triggered at `current_price`.
    /// Checks run in order: stop-loss, take-profit, trailing-stop tighten, max age, adverse
    /// microstructure. A trailing-enabled position that clears SL/TP has its stop tightened and
    /// is thereby maintained for this tick, never falling through to the max-age/adverse checks.
    /// Adverse-condition lookups that error are treated as no-adverse, not as a trigger.
    async fn evaluate(&self, position: &Position, current_price: Decimal) -> Option<CloseReason> {
        if let Some(stop_loss) = position.stop_loss {
            let hit = match position.side {
                OrderSide::Buy => current_price <= stop_loss,
                OrderSide::Sell => current_price >= stop_loss,
            };
            if hit {
                return Some(CloseReason::StopLoss);
            }
        }

        if let Some(take_profit) = position.take_profit {
            let hit = match position.side {
                OrderSide::Buy => current_price >= take_profit,
                OrderSide::Sell => current_price <= take_profit,
            };
            if hit {
                return Some(CloseReason::TakeProfit);
            }
        }

        if position.trailing_stop_percent.is_some() {
            self.tighten_trailing_stop(position, current_price).await;
            return None;
        }

        if let Some(max_age) = self.settings.max_position_age {
            let age = Utc::now().signed_duration_since(position.opened_at);
            if age.to_std().map(|age| age >= max_age).unwrap_or(false) {
                return Some(CloseReason::MaxAge);
            }
        }

        if self.is_adverse(&position.symbol).await {
            return Some(CloseReason::Adverse);
        }

        None
    }

    async fn tighten_trailing_stop(&self, position: &Position, current_price: Decimal) {
        let mut risk = self.risk.write().await;
        if let Some(mut tracked) = risk.portfolio().open_positions.get(&position.id).cloned() {
            tracked.update_trailing_stop(current_price);
            risk.add_position(tracked);
        }
    }

    async fn is_adverse(&self, symbol: &str) -> bool {
        let book = match self.gateway.order_book(symbol, 20).await {
            Ok(book) => book,
            Err(_) => return false,
        };
        let Some(metrics) = microstructure::analyze(&book) else {
            return false;
        };
        let top_ten_liquidity = order_book_metrics::liquidity_value(&book, 10);

        metrics.spread_percent > self.settings.adverse_spread_percent
            || top_ten_liquidity < self.settings.adverse_min_liquidity_quote
    }

    async fn close(&self, position: &Position, reason: CloseReason) {
        let result = match self.lifecycle.close_position(position, reason, false).await {
            Ok(result) => result,
            Err(err) => {
                warn!(position_id = %position.id, error = %err, "position monitor closure failed, retrying next tick");
                return;
            }
        };

        let mut risk = self.risk.write().await;
        if result.fully_closed {
            risk.remove_position(&position.id);
        } else if let Some(mut remaining) = risk.portfolio().open_positions.get(&position.id).cloned() {
            remaining.quantity -= result.closed_quantity;
            risk.add_position(remaining);
        }
        drop(risk);

        if let Some(repository) = &self.repository {
            let trade = ClosedTrade {
                id: position.id.clone(),
                symbol: position.symbol.clone(),
                strategy_name: String::new(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price: result.exit_price,
                quantity: result.closed_quantity,
                realised_pnl: result.realised_pnl,
                fees: Decimal::ZERO,
                opened_at: position.opened_at,
                closed_at: Utc::now(),
                close_reason: reason,
            };
            if let Err(err) = repository.append(&trade).await {
                warn!(position_id = %position.id, error = %err, "failed to persist closed trade");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::config::{ExecutionConfig, RiskConfig};
    use crate::domain::errors::GatewayError;
    use crate::domain::ports::{AccountSnapshot, ExchangeOrderAck, OrderStatusReport};
    use crate::domain::trading::types::{Candle, OrderBook, OrderType};

    struct NullGateway;

    #[async_trait]
    impl ExchangeGateway for NullGateway {
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
        async fn order_book(&self, symbol: &str, _depth: usize) -> Result<OrderBook, GatewayError> {
            // Empty book: `is_adverse` treats the resulting `analyze` miss as no-adverse.
            Ok(OrderBook { symbol: symbol.to_string(), captured_at: Utc::now(), bids: vec![], asks: vec![] })
        }
        async fn latest_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
            unimplemented!()
        }
        async fn historical_candles(&self, _symbol: &str, _interval: &str, _lookback: usize) -> Result<Vec<Candle>, GatewayError> {
            unimplemented!()
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings::default()
    }

    fn position(side: OrderSide, stop_loss: Decimal, take_profit: Decimal) -> Position {
        Position {
            id: "p1".to_string(),
            symbol: "BTC/USDT".to_string(),
            side,
            entry_price: dec!(42_000),
            quantity: dec!(0.1),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            trailing_stop_percent: None,
            max_favourable_price: None,
            opened_at: Utc::now(),
        }
    }

    fn monitor_with(gateway: Arc<dyn ExchangeGateway>) -> PositionMonitor {
        let execution = ExecutionConfig {
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
            poll_interval_seconds: 1,
            poll_timeout_seconds: 10,
            poll_max_consecutive_errors: 3,
        };
        let lifecycle = Arc::new(OrderLifecycle::new(gateway.clone(), &execution));
        let risk_config = RiskConfig {
            max_open_positions: 5,
            daily_loss_cap_percent: 0.05,
            drawdown_cap_percent: 0.10,
            symbol_exposure_cap_percent: 0.30,
            risk_per_trade_percent: 0.02,
            max_slippage_percent: 0.5,
            min_liquidity_quote: dec!(50_000),
            min_quote_reserve_percent: 0.10,
        };
        let risk = Arc::new(RwLock::new(RiskManager::new(risk_config, execution)));
        PositionMonitor::new(gateway, lifecycle, risk, None, settings())
    }

    #[tokio::test]
    async fn buy_position_triggers_stop_loss_when_price_falls_through() {
        let monitor = monitor_with(Arc::new(NullGateway));
        let position = position(OrderSide::Buy, dec!(41_160), dec!(43_680));
        let reason = monitor.evaluate(&position, dec!(41_000)).await;
        assert_eq!(reason, Some(CloseReason::StopLoss));
    }

    #[tokio::test]
    async fn buy_position_triggers_take_profit_when_price_rallies_through() {
        let monitor = monitor_with(Arc::new(NullGateway));
        let position = position(OrderSide::Buy, dec!(41_160), dec!(43_680));
        let reason = monitor.evaluate(&position, dec!(44_000)).await;
        assert_eq!(reason, Some(CloseReason::TakeProfit));
    }

    #[tokio::test]
    async fn healthy_position_triggers_nothing() {
        let monitor = monitor_with(Arc::new(NullGateway));
        let position = position(OrderSide::Buy, dec!(41_160), dec!(43_680));
        let reason = monitor.evaluate(&position, dec!(42_100)).await;
        assert_eq!(reason, None);
    }
}
