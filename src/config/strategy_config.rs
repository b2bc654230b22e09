use std::env;

/// Per-factor weights and decision thresholds for the multi-factor Strategy Engine. All weights
/// default to 1.0 so an operator can tune a single factor without re-specifying the rest.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub weight_volume_profile_position: f64,
    pub weight_order_book_imbalance: f64,
    pub weight_cvd_divergence: f64,
    pub weight_supply_demand_zone: f64,
    pub weight_hvn_proximity: f64,
    pub weight_time_volume_amplifier: f64,
    pub min_buy_score: f64,
    pub min_sell_score: f64,
}

impl StrategyConfig {
    pub fn from_env() -> Self {
        Self {
            weight_volume_profile_position: env_parse("STRATEGY_WEIGHT_VOLUME_PROFILE", 1.0),
            weight_order_book_imbalance: env_parse("STRATEGY_WEIGHT_ORDER_BOOK_IMBALANCE", 1.0),
            weight_cvd_divergence: env_parse("STRATEGY_WEIGHT_CVD_DIVERGENCE", 1.0),
            weight_supply_demand_zone: env_parse("STRATEGY_WEIGHT_SUPPLY_DEMAND_ZONE", 1.0),
            weight_hvn_proximity: env_parse("STRATEGY_WEIGHT_HVN_PROXIMITY", 1.0),
            weight_time_volume_amplifier: env_parse("STRATEGY_WEIGHT_TIME_VOLUME_AMPLIFIER", 1.0),
            min_buy_score: env_parse("STRATEGY_MIN_BUY_SCORE", 4.0),
            min_sell_score: env_parse("STRATEGY_MIN_SELL_SCORE", 4.0),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, value) in [
            ("STRATEGY_WEIGHT_VOLUME_PROFILE", self.weight_volume_profile_position),
            ("STRATEGY_WEIGHT_ORDER_BOOK_IMBALANCE", self.weight_order_book_imbalance),
            ("STRATEGY_WEIGHT_CVD_DIVERGENCE", self.weight_cvd_divergence),
            ("STRATEGY_WEIGHT_SUPPLY_DEMAND_ZONE", self.weight_supply_demand_zone),
            ("STRATEGY_WEIGHT_HVN_PROXIMITY", self.weight_hvn_proximity),
            ("STRATEGY_WEIGHT_TIME_VOLUME_AMPLIFIER", self.weight_time_volume_amplifier),
        ] {
            if value < 0.0 {
                errors.push(format!("{} must be >= 0, got {}", name, value));
            }
        }
        if self.min_buy_score <= 0.0 {
            errors.push("STRATEGY_MIN_BUY_SCORE must be > 0".to_string());
        }
        if self.min_sell_score <= 0.0 {
            errors.push("STRATEGY_MIN_SELL_SCORE must be > 0".to_string());
        }
        errors
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
