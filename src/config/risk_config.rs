use std::env;

use rust_decimal::Decimal;

/// Risk Manager gate thresholds. All percent fields are fractions (`0.05` == 5%).
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_open_positions: usize,
    pub daily_loss_cap_percent: f64,
    pub drawdown_cap_percent: f64,
    pub symbol_exposure_cap_percent: f64,
    pub risk_per_trade_percent: f64,
    pub max_slippage_percent: f64,
    pub min_liquidity_quote: Decimal,
    pub min_quote_reserve_percent: f64,
}

impl RiskConfig {
    pub fn from_env() -> Self {
        Self {
            max_open_positions: env_parse("RISK_MAX_OPEN_POSITIONS", 5),
            daily_loss_cap_percent: env_parse("RISK_DAILY_LOSS_CAP_PERCENT", 0.05),
            drawdown_cap_percent: env_parse("RISK_DRAWDOWN_CAP_PERCENT", 0.10),
            symbol_exposure_cap_percent: env_parse("RISK_SYMBOL_EXPOSURE_CAP_PERCENT", 0.30),
            risk_per_trade_percent: env_parse("RISK_PER_TRADE_PERCENT", 0.02),
            max_slippage_percent: env_parse("RISK_MAX_SLIPPAGE_PERCENT", 0.005),
            min_liquidity_quote: env_parse_decimal("RISK_MIN_LIQUIDITY_QUOTE", Decimal::new(50_000, 0)),
            min_quote_reserve_percent: env_parse("RISK_MIN_QUOTE_RESERVE_PERCENT", 0.10),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_open_positions == 0 {
            errors.push("RISK_MAX_OPEN_POSITIONS must be > 0".to_string());
        }
        for (name, value) in [
            ("RISK_DAILY_LOSS_CAP_PERCENT", self.daily_loss_cap_percent),
            ("RISK_DRAWDOWN_CAP_PERCENT", self.drawdown_cap_percent),
            ("RISK_SYMBOL_EXPOSURE_CAP_PERCENT", self.symbol_exposure_cap_percent),
            ("RISK_PER_TRADE_PERCENT", self.risk_per_trade_percent),
            ("RISK_MAX_SLIPPAGE_PERCENT", self.max_slippage_percent),
            ("RISK_MIN_QUOTE_RESERVE_PERCENT", self.min_quote_reserve_percent),
        ] {
            if !(value > 0.0 && value < 1.0) {
                errors.push(format!("{} must be in (0, 1), got {}", name, value));
            }
        }
        if self.min_liquidity_quote <= Decimal::ZERO {
            errors.push("RISK_MIN_LIQUIDITY_QUOTE must be > 0".to_string());
        }
        errors
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_parse_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<Decimal>().ok())
        .unwrap_or(default)
}
