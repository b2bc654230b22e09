//! Prometheus metrics definitions for the control plane.
//!
//! All metrics use the `spotcore_` prefix and are read-only from the rest of the system's
//! perspective: callers set/inc them, nothing ever scrapes them over HTTP by default — see
//! [`super::reporter::MetricsReporter`] for the push path.

use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Total quote-asset equity across tracked balances.
    pub account_equity_quote: GenericGauge<AtomicF64>,
    /// Count of currently open positions.
    pub open_positions_count: GenericGauge<AtomicF64>,
    /// Notional value per open position, keyed by symbol.
    pub position_notional_quote: GenericGaugeVec<AtomicF64>,
    /// Realised P&L since the start of the current trading day.
    pub daily_pnl_quote: GenericGauge<AtomicF64>,
    /// Current drawdown from the equity high water mark, 0-1.
    pub drawdown_current: GenericGauge<AtomicF64>,
    /// Consecutive losing trades since the last win.
    pub consecutive_losses: GenericGauge<AtomicF64>,
    /// Orders submitted, keyed by side and terminal status.
    pub orders_total: CounterVec,
    /// Circuit breaker status per gateway, 0=closed 1=open.
    pub circuit_breaker_status: GaugeVec,
    /// Exchange request latency.
    pub exchange_latency_seconds: HistogramVec,
    /// WebSocket reconnection attempts.
    pub websocket_reconnects_total: CounterVec,
    /// Signals emitted by the strategy engine, keyed by direction.
    pub signals_total: CounterVec,
    /// Signals rejected by the risk manager, keyed by rejection reason.
    pub risk_rejections_total: CounterVec,
    /// Requests throttled or rejected by the rate limiter.
    pub rate_limiter_events_total: CounterVec,
    /// Process uptime.
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let account_equity_quote = Gauge::with_opts(Opts::new(
            "spotcore_account_equity_quote",
            "Total quote-asset equity across tracked balances",
        ))?;
        registry.register(Box::new(account_equity_quote.clone()))?;

        let open_positions_count = Gauge::with_opts(Opts::new(
            "spotcore_open_positions_count",
            "Number of currently open positions",
        ))?;
        registry.register(Box::new(open_positions_count.clone()))?;

        let position_notional_quote = GaugeVec::new(
            Opts::new(
                "spotcore_position_notional_quote",
                "Notional value of each open position in quote asset",
            ),
            &["symbol"],
        )?;
        registry.register(Box::new(position_notional_quote.clone()))?;

        let daily_pnl_quote = Gauge::with_opts(Opts::new(
            "spotcore_daily_pnl_quote",
            "Realised P&L since the start of the current trading day",
        ))?;
        registry.register(Box::new(daily_pnl_quote.clone()))?;

        let drawdown_current = Gauge::with_opts(Opts::new(
            "spotcore_drawdown_current",
            "Current drawdown from the equity high water mark (0-1)",
        ))?;
        registry.register(Box::new(drawdown_current.clone()))?;

        let consecutive_losses = Gauge::with_opts(Opts::new(
            "spotcore_consecutive_losses",
            "Consecutive losing trades since the last win",
        ))?;
        registry.register(Box::new(consecutive_losses.clone()))?;

        let orders_total = CounterVec::new(
            Opts::new("spotcore_orders_total", "Total orders by side and terminal status"),
            &["side", "status"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        let circuit_breaker_status = GaugeVec::new(
            Opts::new(
                "spotcore_circuit_breaker_status",
                "Circuit breaker status per gateway (0=closed, 1=open)",
            ),
            &["gateway"],
        )?;
        registry.register(Box::new(circuit_breaker_status.clone()))?;

        let exchange_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "spotcore_exchange_latency_seconds",
                "Exchange request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(exchange_latency_seconds.clone()))?;

        let websocket_reconnects_total = CounterVec::new(
            Opts::new(
                "spotcore_websocket_reconnects_total",
                "Total WebSocket reconnection attempts",
            ),
            &["stream"],
        )?;
        registry.register(Box::new(websocket_reconnects_total.clone()))?;

        let signals_total = CounterVec::new(
            Opts::new("spotcore_signals_total", "Total strategy signals generated"),
            &["direction"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        let risk_rejections_total = CounterVec::new(
            Opts::new("spotcore_risk_rejections_total", "Signals rejected by the risk manager"),
            &["reason"],
        )?;
        registry.register(Box::new(risk_rejections_total.clone()))?;

        let rate_limiter_events_total = CounterVec::new(
            Opts::new(
                "spotcore_rate_limiter_events_total",
                "Requests throttled or rejected by the rate limiter",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rate_limiter_events_total.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "spotcore_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            account_equity_quote,
            open_positions_count,
            position_notional_quote,
            daily_pnl_quote,
            drawdown_current,
            consecutive_losses,
            orders_total,
            circuit_breaker_status,
            exchange_latency_seconds,
            websocket_reconnects_total,
            signals_total,
            risk_rejections_total,
            rate_limiter_events_total,
            uptime_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn set_position_notional(&self, symbol: &str, value: f64) {
        self.position_notional_quote.with_label_values(&[symbol]).set(value);
    }

    pub fn inc_orders(&self, side: &str, status: &str) {
        self.orders_total.with_label_values(&[side, status]).inc();
    }

    pub fn set_circuit_breaker_status(&self, gateway: &str, open: bool) {
        self.circuit_breaker_status
            .with_label_values(&[gateway])
            .set(if open { 1.0 } else { 0.0 });
    }

    pub fn observe_exchange_latency(&self, operation: &str, seconds: f64) {
        self.exchange_latency_seconds.with_label_values(&[operation]).observe(seconds);
    }

    pub fn inc_reconnects(&self, stream: &str) {
        self.websocket_reconnects_total.with_label_values(&[stream]).inc();
    }

    pub fn inc_signals(&self, direction: &str) {
        self.signals_total.with_label_values(&[direction]).inc();
    }

    pub fn inc_risk_rejection(&self, reason: &str) {
        self.risk_rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_rate_limiter_event(&self, kind: &str) {
        self.rate_limiter_events_total.with_label_values(&[kind]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to construct default metrics registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_the_service_prefix() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.render().contains("spotcore_"));
    }

    #[test]
    fn position_notional_is_labelled_per_symbol() {
        let metrics = Metrics::new().unwrap();
        metrics.set_position_notional("BTCUSDT", 10_000.0);
        metrics.set_position_notional("ETHUSDT", 4_000.0);
        let output = metrics.render();
        assert!(output.contains("BTCUSDT"));
        assert!(output.contains("ETHUSDT"));
    }

    #[test]
    fn circuit_breaker_status_reflects_open_state() {
        let metrics = Metrics::new().unwrap();
        metrics.set_circuit_breaker_status("binance", true);
        assert!(metrics.render().contains("spotcore_circuit_breaker_status"));
    }
}
