//! Emergency Controller: loss-limit and kill-switch enforcement. Fans out a concurrent
//! liquidation of every open position the moment any trigger fires, and keeps trading paused
//! until an operator explicitly resumes it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::application::execution::lifecycle::OrderLifecycle;
use crate::application::risk::RiskManager;
use crate::domain::ports::ExchangeGateway;
use crate::domain::repositories::{ClosedTrade, TradeRepository};
use crate::domain::trading::types::CloseReason;

fn default_max_single_position_loss_percent() -> Decimal {
    dec!(0.10)
}

/// Tunables for trigger thresholds. Like [`crate::application::monitor::MonitorSettings`], these
/// are operating parameters for a single in-process controller, not part of the validated
/// `Config` aggregate.
#[derive(Debug, Clone)]
pub struct EmergencySettings {
    pub max_single_position_loss_percent: Decimal,
    pub kill_switch_path: PathBuf,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            max_single_position_loss_percent: default_max_single_position_loss_percent(),
            kill_switch_path: PathBuf::from("EMERGENCY_STOP"),
        }
    }
}

/// What tripped the emergency stop, carried through for logging and the aggregated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyTrigger {
    DailyLoss,
    PositionLoss,
    KillSwitch,
    Manual,
}

/// Outcome of one liquidation sweep.
#[derive(Debug, Clone)]
pub struct LiquidationReport {
    pub trigger: EmergencyTrigger,
    pub closed: usize,
    pub failed: usize,
    pub total_realised_pnl: Decimal,
}

pub struct EmergencyController {
    gateway: Arc<dyn ExchangeGateway>,
    lifecycle: Arc<OrderLifecycle>,
    risk: Arc<RwLock<RiskManager>>,
    repository: Option<Arc<dyn TradeRepository>>,
    settings: EmergencySettings,
    emergency_mode: AtomicBool,
    trading_paused: AtomicBool,
    closing: Mutex<()>,
}

impl EmergencyController {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        lifecycle: Arc<OrderLifecycle>,
        risk: Arc<RwLock<RiskManager>>,
        repository: Option<Arc<dyn TradeRepository>>,
        settings: EmergencySettings,
    ) -> Self {
        Self {
            gateway,
            lifecycle,
            risk,
            repository,
            settings,
            emergency_mode: AtomicBool::new(false),
            trading_paused: AtomicBool::new(false),
            closing: Mutex::new(()),
        }
    }

    pub fn is_trading_paused(&self) -> bool {
        self.trading_paused.load(Ordering::SeqCst)
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.emergency_mode.load(Ordering::SeqCst)
    }

    /// Re-arms the controller after an operator has confirmed it is safe to keep trading.
    pub fn resume_trading(&self) {
        self.emergency_mode.store(false, Ordering::SeqCst);
        self.trading_paused.store(false, Ordering::SeqCst);
        info!("trading resumed after emergency stop");
    }

    /// Checks every trigger and, if any fires, liquidates all open positions. Call this at the
    /// start of every orchestrator cycle.
    pub async fn check(&self) -> Option<LiquidationReport> {
        if let Some(trigger) = self.detect_trigger().await {
            return Some(self.trigger_emergency_stop(trigger).await);
        }
        None
    }

    async fn detect_trigger(&self) -> Option<EmergencyTrigger> {
        if self.settings.kill_switch_path.exists() {
            return Some(EmergencyTrigger::KillSwitch);
        }

        let risk = self.risk.read().await;
        let daily_loss_cap = risk.risk_config().daily_loss_cap_percent;
        let daily_pnl_percent = risk.portfolio().daily_pnl_percent().to_f64().unwrap_or(0.0);
        if daily_pnl_percent <= -daily_loss_cap {
            return Some(EmergencyTrigger::DailyLoss);
        }

        let positions: Vec<_> = risk.portfolio().open_positions.values().cloned().collect();
        drop(risk);

        for position in positions {
            let current_price = match self.gateway.latest_price(&position.symbol).await {
                Ok(price) => price,
                Err(_) => continue,
            };
            if position.unrealized_pnl_percent(current_price) <= -self.settings.max_single_position_loss_percent {
                return Some(EmergencyTrigger::PositionLoss);
            }
        }

        None
    }

    /// Liquidates every open position concurrently. A second call while one sweep is already in
    /// flight is a no-op — `try_lock` fails immediately instead of queuing behind it.
    pub async fn trigger_emergency_stop(&self, trigger: EmergencyTrigger) -> LiquidationReport {
        let Ok(_guard) = self.closing.try_lock() else {
            warn!("emergency stop already in progress; ignoring concurrent trigger");
            return LiquidationReport { trigger, closed: 0, failed: 0, total_realised_pnl: Decimal::ZERO };
        };

        self.emergency_mode.store(true, Ordering::SeqCst);
        self.trading_paused.store(true, Ordering::SeqCst);
        error!(?trigger, "emergency stop triggered, liquidating all open positions");

        let positions: Vec<_> = self.risk.read().await.portfolio().open_positions.values().cloned().collect();

        let closures = join_all(positions.iter().map(|position| {
            let lifecycle = self.lifecycle.clone();
            async move { lifecycle.close_position_best_effort(position, CloseReason::Emergency).await }
        }))
        .await;

        let mut closed = 0;
        let mut failed = 0;
        let mut total_realised_pnl = Decimal::ZERO;

        let mut risk = self.risk.write().await;
        for (position, outcome) in positions.iter().zip(closures.into_iter()) {
            match outcome {
                Some(result) => {
                    closed += 1;
                    total_realised_pnl += result.realised_pnl;
                    if result.fully_closed {
                        risk.remove_position(&position.id);
                    } else {
                        let mut remaining = position.clone();
                        remaining.quantity -= result.closed_quantity;
                        risk.add_position(remaining);
                    }
                    self.persist(position, &result).await;
                }
                None => {
                    failed += 1;
                }
            }
        }
        drop(risk);

        info!(?trigger, closed, failed, %total_realised_pnl, "emergency liquidation sweep complete");
        LiquidationReport { trigger, closed, failed, total_realised_pnl }
    }

    async fn persist(
        &self,
        position: &crate::domain::trading::portfolio::Position,
        result: &crate::application::execution::lifecycle::ClosureResult,
    ) {
        let Some(repository) = &self.repository else { return };
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
            closed_at: chrono::Utc::now(),
            close_reason: CloseReason::Emergency,
        };
        if let Err(err) = repository.append(&trade).await {
            warn!(position_id = %position.id, error = %err, "failed to persist emergency-closed trade");
        }
    }
}
