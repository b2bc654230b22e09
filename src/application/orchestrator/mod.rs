//! Orchestrator: owns the top-level process lifecycle and the per-cycle
//! signal → dedup → risk → route → execute pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::emergency::EmergencyController;
use crate::application::execution::poller::OrderStatusPoller;
use crate::application::execution::{route, RoutingDecision, TwapExecutor};
use crate::application::market_data::MarketDataCache;
use crate::application::monitor::PositionMonitor;
use crate::application::risk::{RiskManager, SignalDeduplicator};
use crate::application::strategy::StrategyEngine;
use crate::config::Config;
use crate::domain::market::{microstructure, order_book_metrics};
use crate::domain::ports::{AccountSnapshot, ExchangeGateway, MarketStream};
use crate::domain::trading::portfolio::Position;
use crate::domain::trading::types::{normalize_crypto_symbol, OrderSide, OrderType, Signal};
use crate::infrastructure::observability::{
    AccountSnapshot as MetricsAccountSnapshot, MetricsSource, PositionSnapshotEntry,
};

const CANDLE_INTERVAL: &str = "1m";
const CANDLE_LOOKBACK: usize = 100;
const BOOK_DEPTH: usize = 20;

fn default_cycle_interval() -> Duration {
    Duration::from_secs(15)
}

/// Cadence tunables for the main loop. Not part of the typed `Config` aggregate, for the same
/// reason as [`crate::application::monitor::MonitorSettings`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub cycle_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { cycle_interval: default_cycle_interval() }
    }
}

fn quote_asset_of(symbol: &str) -> &str {
    symbol.split('/').nth(1).unwrap_or(symbol)
}

pub struct Orchestrator {
    config: Config,
    symbols: Vec<String>,
    gateway: Arc<dyn ExchangeGateway>,
    market_data: Arc<MarketDataCache>,
    strategies: Mutex<HashMap<String, StrategyEngine>>,
    dedup: Mutex<SignalDeduplicator>,
    risk: Arc<RwLock<RiskManager>>,
    poller: OrderStatusPoller,
    twap: TwapExecutor,
    monitor: Arc<PositionMonitor>,
    emergency: Arc<EmergencyController>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        gateway: Arc<dyn ExchangeGateway>,
        stream: Option<Arc<dyn MarketStream>>,
        risk: Arc<RwLock<RiskManager>>,
        monitor: Arc<PositionMonitor>,
        emergency: Arc<EmergencyController>,
        settings: OrchestratorSettings,
    ) -> Self {
        let symbols = config
            .instruments
            .symbols
            .iter()
            .filter_map(|raw| match normalize_crypto_symbol(raw) {
                Ok(normalized) => Some(normalized),
                Err(err) => {
                    warn!(symbol = raw, error = %err, "skipping unrecognized instrument");
                    None
                }
            })
            .collect();

        let market_data = Arc::new(MarketDataCache::new(gateway.clone(), stream));
        let poller = OrderStatusPoller::new(gateway.clone(), &config.execution);
        let twap = TwapExecutor::new(gateway.clone(), config.execution.clone());

        Self {
            config,
            symbols,
            gateway,
            market_data,
            strategies: Mutex::new(HashMap::new()),
            dedup: Mutex::new(SignalDeduplicator::default()),
            risk,
            poller,
            twap,
            monitor,
            emergency,
            settings,
        }
    }

    pub fn market_data(&self) -> Arc<MarketDataCache> {
        self.market_data.clone()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Runs until `stop` is signalled. Starts the Position Monitor and, if configured, the live
    /// market data streams as sibling tasks, then drives the cycle loop; on shutdown, stops them
    /// in the documented order (monitor, then streams, then the gateway/database handles the
    /// caller owns and tears down after `run` returns).
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.startup().await?;

        let (monitor_stop_tx, monitor_stop_rx) = watch::channel(false);
        let monitor = self.monitor.clone();
        let monitor_handle = tokio::spawn(async move { monitor.run(monitor_stop_rx).await });

        let (stream_stop_tx, stream_stop_rx) = watch::channel(false);
        let market_data = self.market_data.clone();
        let symbols = self.symbols.clone();
        let stream_handle = tokio::spawn(async move { market_data.run_streams(symbols, stream_stop_rx).await });

        let mut interval = tokio::time::interval(self.settings.cycle_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.run_cycle().await {
                        error!(error = %err, "orchestrator cycle failed");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("orchestrator stopping: shutting down position monitor");
        let _ = monitor_stop_tx.send(true);
        let _ = monitor_handle.await;

        info!("orchestrator stopping: shutting down market data streams");
        let _ = stream_stop_tx.send(true);
        let _ = stream_handle.await;

        Ok(())
    }

    async fn startup(&self) -> anyhow::Result<()> {
        let account = self.gateway.account_snapshot().await.context("startup account snapshot failed")?;
        let balance = self.reference_balance(&account);
        self.risk.write().await.set_daily_start(balance);
        info!(balance = %balance, instruments = ?self.symbols, "orchestrator started");
        Ok(())
    }

    /// Uses the first configured instrument's quote asset as the balance the daily-loss and
    /// drawdown gates track. Single-quote-currency deployments (the common case) need nothing
    /// more precise than this.
    fn reference_balance(&self, account: &AccountSnapshot) -> Decimal {
        let quote_asset = self.symbols.first().map(|s| quote_asset_of(s)).unwrap_or("USDT");
        account.quote_balance(quote_asset)
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        if let Some(report) = self.emergency.check().await {
            warn!(
                trigger = ?report.trigger,
                closed = report.closed,
                failed = report.failed,
                pnl = %report.total_realised_pnl,
                "emergency stop triggered this cycle"
            );
            return Ok(());
        }
        if self.emergency.is_trading_paused() {
            debug!("trading paused, skipping cycle");
            return Ok(());
        }

        let account = match self.gateway.account_snapshot().await {
            Ok(account) => account,
            Err(err) => {
                warn!(error = %err, "account snapshot failed, skipping cycle");
                return Ok(());
            }
        };

        for symbol in self.symbols.clone() {
            if let Err(err) = self.process_symbol(&symbol, &account).await {
                warn!(symbol, error = %err, "cycle failed for instrument");
            }
        }
        Ok(())
    }

    async fn process_symbol(&self, symbol: &str, account: &AccountSnapshot) -> anyhow::Result<()> {
        let candles = self.market_data.candles(symbol, CANDLE_INTERVAL, CANDLE_LOOKBACK).await.context("candle fetch failed")?;
        let book = self.market_data.order_book(symbol, BOOK_DEPTH).await.context("order book fetch failed")?;
        let trades = self.market_data.recent_trades(symbol).await;

        let signal = {
            let mut strategies = self.strategies.lock().await;
            let engine = strategies.entry(symbol.to_string()).or_insert_with(|| StrategyEngine::new(self.config.strategy.clone()));
            engine.evaluate(symbol, &candles, &book, &trades, Utc::now())
        };
        let Some(signal) = signal else { return Ok(()) };

        if self.dedup.lock().await.is_duplicate(&signal) {
            debug!(symbol, "duplicate signal suppressed");
            return Ok(());
        }

        let balance = account.quote_balance(quote_asset_of(symbol));
        let sizing = {
            let risk = self.risk.read().await;
            match risk.validate(&signal, balance, &book) {
                Ok(sizing) => sizing,
                Err(rejection) => {
                    info!(symbol, %rejection, "signal rejected by risk manager");
                    return Ok(());
                }
            }
        };

        let micro = microstructure::analyze(&book);
        let liquidity = micro.as_ref().map(|m| m.liquidity_quality).unwrap_or(order_book_metrics::LiquidityQuality::Poor);
        let spread = micro.as_ref().map(|m| m.spread_quality).unwrap_or(microstructure::SpreadQuality::Poor);
        let decision = route(sizing.position_value, liquidity, spread, &self.config.execution);

        let fill = match decision {
            RoutingDecision::Reject { reason } => {
                info!(symbol, reason, "order rejected by router");
                None
            }
            RoutingDecision::Market => self.execute_direct(&signal, sizing.quantity, OrderType::Market).await?,
            RoutingDecision::Limit => self.execute_direct(&signal, sizing.quantity, OrderType::Limit).await?,
            RoutingDecision::Twap { .. } => self.execute_twap(&signal, sizing.quantity).await?,
        };

        let Some((fill_price, filled_quantity, _fees)) = fill else { return Ok(()) };

        let position = Position {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: signal.side,
            entry_price: fill_price,
            quantity: filled_quantity,
            stop_loss: Some(signal.stop_loss),
            take_profit: Some(signal.take_profit),
            trailing_stop_percent: None,
            max_favourable_price: None,
            opened_at: Utc::now(),
        };
        info!(symbol, side = %signal.side, %fill_price, %filled_quantity, "position opened");
        self.risk.write().await.add_position(position);
        self.dedup.lock().await.register_execution(&signal);

        Ok(())
    }

    /// `(fill_price, filled_quantity, fees)`, or `None` if the order did not fill at all.
    async fn execute_direct(
        &self,
        signal: &Signal,
        quantity: Decimal,
        order_type: OrderType,
    ) -> anyhow::Result<Option<(Decimal, Decimal, Decimal)>> {
        let limit_price = match order_type {
            OrderType::Limit => Some(signal.entry_price),
            _ => None,
        };
        let client_order_id = Uuid::new_v4().to_string();
        let ack = self
            .gateway
            .place_order(&signal.symbol, signal.side, order_type, quantity, limit_price, &client_order_id)
            .await
            .context("order submission failed")?;

        let report = self
            .poller
            .wait_for_fill(&signal.symbol, &ack.exchange_order_id, None)
            .await
            .context("order fill tracking failed")?;

        if report.filled_quantity <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, status = ?report.status, "order did not fill");
            return Ok(None);
        }

        let fill_price = report.average_fill_price.unwrap_or(signal.entry_price);
        Ok(Some((fill_price, report.filled_quantity, report.fees)))
    }

    async fn execute_twap(&self, signal: &Signal, quantity: Decimal) -> anyhow::Result<Option<(Decimal, Decimal, Decimal)>> {
        let result = self.twap.execute(&signal.symbol, signal.side, quantity).await.context("twap execution failed")?;
        if result.total_filled <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, stop_reason = ?result.stop_reason, "twap filled nothing");
            return Ok(None);
        }
        Ok(Some((result.average_fill_price, result.total_filled, result.total_fees_quote)))
    }
}

/// Feeds the push-based metrics reporter. Notional is priced at entry rather than a fresh mark,
/// since a metrics snapshot is a low-frequency side channel, not a trading decision.
#[async_trait]
impl MetricsSource for Orchestrator {
    async fn snapshot(&self) -> MetricsAccountSnapshot {
        let risk = self.risk.read().await;
        let portfolio = risk.portfolio();
        let equity_quote = portfolio.daily_start_balance + portfolio.running_daily_pnl;
        let drawdown_current = portfolio.drawdown_percent(equity_quote).to_f64().unwrap_or(0.0);
        let positions = portfolio
            .open_positions
            .values()
            .map(|p| PositionSnapshotEntry { symbol: p.symbol.clone(), notional_quote: p.notional(p.entry_price) })
            .collect();

        MetricsAccountSnapshot {
            equity_quote,
            daily_pnl_quote: portfolio.running_daily_pnl,
            drawdown_current,
            consecutive_losses: 0,
            positions,
        }
    }
}

/// Lets the reporter hold the same `Arc<Orchestrator>` the run loop and main own, rather than
/// forcing a second handle.
#[async_trait]
impl MetricsSource for Arc<Orchestrator> {
    async fn snapshot(&self) -> MetricsAccountSnapshot {
        MetricsSource::snapshot(self.as_ref()).await
    }
}
