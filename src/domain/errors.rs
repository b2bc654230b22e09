//! Error taxonomy for the trading control plane.
//!
//! Each enum corresponds to one of the kinds in the error-handling design: callers match on
//! variants to decide retry/halt/propagate behaviour rather than on formatted text.

use thiserror::Error;

/// Errors surfaced by the Exchange Gateway. Maps directly onto the taxonomy: transient/permanent
/// transport errors, clock skew, authentication, and rate limiting (which is otherwise absorbed
/// internally and should not normally reach this type).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transient transport error calling {operation}: {source}")]
    TransportTransient {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("permanent transport error calling {operation}: status {status}, body {body}")]
    TransportPermanent { operation: String, status: u16, body: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("clock skew detected (exchange code -1021); re-syncing")]
    ClockSkew,

    #[error("circuit breaker open for {operation}, retry after cooldown")]
    CircuitOpen { operation: String },

    #[error("rate limiter daily order cap reached ({used}/{cap})")]
    RateLimitedDailyCap { used: u64, cap: u64 },

    #[error("gateway call to {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// Errors raised while validating or sizing a signal in the Risk Manager.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskRejection {
    #[error("microstructure invalid for {symbol}: spread or liquidity poor")]
    PoorMicrostructure { symbol: String },

    #[error("open position count at cap: {current}/{max}")]
    PositionCountAtCap { current: usize, max: usize },

    #[error("daily loss {observed_pct:.4} exceeds cap {cap_pct:.4}")]
    DailyLossCapBreached { observed_pct: f64, cap_pct: f64 },

    #[error("drawdown {observed_pct:.4} exceeds cap {cap_pct:.4}")]
    DrawdownCapBreached { observed_pct: f64, cap_pct: f64 },

    #[error("symbol exposure {observed_pct:.4} for {symbol} exceeds cap {cap_pct:.4}")]
    SymbolExposureCapBreached { symbol: String, observed_pct: f64, cap_pct: f64 },

    #[error("position sizing infeasible for {symbol}: {reason}")]
    SizingInfeasible { symbol: String, reason: String },

    #[error("quote reserve would be breached: available {available}, required reserve {required}")]
    QuoteReserveBreached { available: String, required: String },

    #[error("final slippage re-validation failed for {symbol}: estimated {estimated_pct:.4} > max {max_pct:.4}")]
    SlippageExceeded { symbol: String, estimated_pct: f64, max_pct: f64 },
}

/// Errors raised while executing, polling, or closing orders.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order {order_id} rejected by exchange: {reason}")]
    Rejected { order_id: String, reason: String },

    #[error("order {order_id} status check failed after {consecutive_errors} consecutive errors: {reason}")]
    StatusCheckFailed { order_id: String, consecutive_errors: u32, reason: String },

    #[error("order {order_id} did not reach a terminal state within {timeout_ms}ms")]
    PollTimeout { order_id: String, timeout_ms: u64 },

    #[error("closing position {position_id} failed: {reason}")]
    ClosureFailed { position_id: String, reason: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Fatal, startup-only configuration errors. Always aggregated into one report.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration invalid:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// An assertion on internal state that should never fail; logging this is a critical event and
/// the affected subsystem stops.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("negative quantity after rounding for order {order_id}: {quantity}")]
    NegativeQuantity { order_id: String, quantity: String },

    #[error("order {order_id} transitioned out of terminal state {from} to {to}")]
    NonMonotonicStatus { order_id: String, from: String, to: String },

    #[error("{0}")]
    Other(String),
}
