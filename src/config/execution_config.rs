use std::env;

use rust_decimal::Decimal;

/// Order Router, TWAP Executor, and Order Status Poller thresholds.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub min_order_size_quote: Decimal,
    pub max_order_size_quote: Decimal,

    pub small_order_threshold_quote: Decimal,
    pub large_order_threshold_quote: Decimal,
    pub twap_chunk_target_quote: Decimal,

    pub twap_default_num_chunks: u32,
    pub twap_interval_seconds: u64,
    pub twap_max_price_deviation_percent: f64,
    pub twap_min_chunk_value_quote: Decimal,
    pub twap_max_spread_percent: f64,

    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
    pub poll_max_consecutive_errors: u32,
}

impl ExecutionConfig {
    pub fn from_env() -> Self {
        Self {
            min_order_size_quote: env_decimal("EXECUTION_MIN_ORDER_SIZE_QUOTE", Decimal::new(10, 0)),
            max_order_size_quote: env_decimal("EXECUTION_MAX_ORDER_SIZE_QUOTE", Decimal::new(50_000, 0)),

            small_order_threshold_quote: env_decimal("EXECUTION_SMALL_ORDER_THRESHOLD_QUOTE", Decimal::new(1_000, 0)),
            large_order_threshold_quote: env_decimal("EXECUTION_LARGE_ORDER_THRESHOLD_QUOTE", Decimal::new(5_000, 0)),
            twap_chunk_target_quote: env_decimal("EXECUTION_TWAP_CHUNK_TARGET_QUOTE", Decimal::new(2_000, 0)),

            twap_default_num_chunks: env_parse("EXECUTION_TWAP_DEFAULT_NUM_CHUNKS", 5),
            twap_interval_seconds: env_parse("EXECUTION_TWAP_INTERVAL_SECONDS", 30),
            twap_max_price_deviation_percent: env_parse("EXECUTION_TWAP_MAX_PRICE_DEVIATION_PERCENT", 0.01),
            twap_min_chunk_value_quote: env_decimal("EXECUTION_TWAP_MIN_CHUNK_VALUE_QUOTE", Decimal::new(50, 0)),
            twap_max_spread_percent: env_parse("EXECUTION_TWAP_MAX_SPREAD_PERCENT", 0.005),

            poll_interval_seconds: env_parse("EXECUTION_POLL_INTERVAL_SECONDS", 2),
            poll_timeout_seconds: env_parse("EXECUTION_POLL_TIMEOUT_SECONDS", 300),
            poll_max_consecutive_errors: env_parse("EXECUTION_POLL_MAX_CONSECUTIVE_ERRORS", 5),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.min_order_size_quote >= self.max_order_size_quote {
            errors.push("EXECUTION_MIN_ORDER_SIZE_QUOTE must be < EXECUTION_MAX_ORDER_SIZE_QUOTE".to_string());
        }
        if self.small_order_threshold_quote >= self.large_order_threshold_quote {
            errors.push(
                "EXECUTION_SMALL_ORDER_THRESHOLD_QUOTE must be < EXECUTION_LARGE_ORDER_THRESHOLD_QUOTE".to_string(),
            );
        }
        if self.twap_default_num_chunks == 0 {
            errors.push("EXECUTION_TWAP_DEFAULT_NUM_CHUNKS must be > 0".to_string());
        }
        if self.twap_interval_seconds == 0 {
            errors.push("EXECUTION_TWAP_INTERVAL_SECONDS must be > 0".to_string());
        }
        if self.poll_interval_seconds == 0 {
            errors.push("EXECUTION_POLL_INTERVAL_SECONDS must be > 0".to_string());
        }
        if self.poll_timeout_seconds <= self.poll_interval_seconds {
            errors.push("EXECUTION_POLL_TIMEOUT_SECONDS must exceed EXECUTION_POLL_INTERVAL_SECONDS".to_string());
        }
        errors
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key).ok().and_then(|v| v.parse::<Decimal>().ok()).unwrap_or(default)
}
