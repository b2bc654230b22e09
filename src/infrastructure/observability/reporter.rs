//! Push-based metrics reporter: periodically logs a structured JSON snapshot of account and
//! risk state to stdout and mirrors it into the Prometheus registry. No HTTP server is run here
//! — scraping is left to [`super::metrics::Metrics::render`] behind whatever bind address
//! [`crate::config::ObservabilityConfig`] names, wired up by the orchestrator.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::metrics::Metrics;

/// Whatever holds live account/risk state implements this so the reporter can poll it without
/// depending on the concrete orchestrator or risk manager types.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn snapshot(&self) -> AccountSnapshot;
}

#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub equity_quote: Decimal,
    pub daily_pnl_quote: Decimal,
    pub drawdown_current: f64,
    pub consecutive_losses: usize,
    pub positions: Vec<PositionSnapshotEntry>,
}

#[derive(Debug, Clone)]
pub struct PositionSnapshotEntry {
    pub symbol: String,
    pub notional_quote: Decimal,
}

#[derive(Serialize)]
struct MetricsSnapshotJson {
    timestamp: String,
    uptime_seconds: u64,
    version: String,
    equity_quote: f64,
    daily_pnl_quote: f64,
    drawdown_current: f64,
    consecutive_losses: usize,
    positions: Vec<PositionSnapshotJson>,
}

#[derive(Serialize)]
struct PositionSnapshotJson {
    symbol: String,
    notional_quote: f64,
}

pub struct MetricsReporter<S: MetricsSource> {
    source: S,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl<S: MetricsSource> MetricsReporter<S> {
    pub fn new(source: S, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            source,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter starting");
        loop {
            tokio::time::sleep(self.interval).await;
            let snapshot = self.source.snapshot().await;
            self.apply_to_registry(&snapshot);

            match self.to_json(&snapshot) {
                Ok(json) => {
                    println!("METRICS_JSON:{json}");
                    info!(
                        equity_quote = %snapshot.equity_quote,
                        daily_pnl_quote = %snapshot.daily_pnl_quote,
                        positions = snapshot.positions.len(),
                        "metrics snapshot emitted"
                    );
                }
                Err(e) => warn!(error = %e, "failed to serialize metrics snapshot"),
            }
        }
    }

    fn apply_to_registry(&self, snapshot: &AccountSnapshot) {
        self.metrics.account_equity_quote.set(snapshot.equity_quote.to_f64().unwrap_or(0.0));
        self.metrics.daily_pnl_quote.set(snapshot.daily_pnl_quote.to_f64().unwrap_or(0.0));
        self.metrics.drawdown_current.set(snapshot.drawdown_current);
        self.metrics.consecutive_losses.set(snapshot.consecutive_losses as f64);
        self.metrics.open_positions_count.set(snapshot.positions.len() as f64);
        for position in &snapshot.positions {
            self.metrics
                .set_position_notional(&position.symbol, position.notional_quote.to_f64().unwrap_or(0.0));
        }
        self.metrics.uptime_seconds.set(self.start_time.elapsed().as_secs() as f64);
    }

    fn to_json(&self, snapshot: &AccountSnapshot) -> anyhow::Result<String> {
        let json = MetricsSnapshotJson {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            equity_quote: snapshot.equity_quote.to_f64().unwrap_or(0.0),
            daily_pnl_quote: snapshot.daily_pnl_quote.to_f64().unwrap_or(0.0),
            drawdown_current: snapshot.drawdown_current,
            consecutive_losses: snapshot.consecutive_losses,
            positions: snapshot
                .positions
                .iter()
                .map(|p| PositionSnapshotJson {
                    symbol: p.symbol.clone(),
                    notional_quote: p.notional_quote.to_f64().unwrap_or(0.0),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(AccountSnapshot);

    #[async_trait]
    impl MetricsSource for FixedSource {
        async fn snapshot(&self) -> AccountSnapshot {
            self.0.clone()
        }
    }

    fn sample_snapshot() -> AccountSnapshot {
        AccountSnapshot {
            equity_quote: Decimal::new(10_000, 0),
            daily_pnl_quote: Decimal::new(150, 0),
            drawdown_current: 0.02,
            consecutive_losses: 1,
            positions: vec![PositionSnapshotEntry {
                symbol: "BTCUSDT".to_string(),
                notional_quote: Decimal::new(2_000, 0),
            }],
        }
    }

    #[tokio::test]
    async fn applies_snapshot_fields_to_the_registry() {
        let metrics = Metrics::new().unwrap();
        let reporter = MetricsReporter::new(FixedSource(sample_snapshot()), metrics, 60);
        let snapshot = reporter.source.snapshot().await;
        reporter.apply_to_registry(&snapshot);
        assert!(reporter.metrics.render().contains("BTCUSDT"));
    }

    #[test]
    fn serializes_snapshot_to_json() {
        let metrics = Metrics::new().unwrap();
        let reporter = MetricsReporter::new(FixedSource(sample_snapshot()), metrics, 60);
        let json = reporter.to_json(&sample_snapshot()).unwrap();
        assert!(json.contains("BTCUSDT"));
        assert!(json.contains("10000"));
    }
}
