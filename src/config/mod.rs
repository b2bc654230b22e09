//! Typed, validated configuration surface. `Config::from_env()` is the only entry point the
//! binaries use; every sub-config's `validate()` runs even after an earlier one fails, so startup
//! reports every violation at once instead of one round-trip per fix.

pub mod exchange_config;
pub mod execution_config;
pub mod instruments_config;
pub mod observability_config;
pub mod risk_config;
pub mod strategy_config;

pub use exchange_config::ExchangeConfig;
pub use execution_config::ExecutionConfig;
pub use instruments_config::InstrumentsConfig;
pub use observability_config::ObservabilityConfig;
pub use risk_config::RiskConfig;
pub use strategy_config::StrategyConfig;

use crate::domain::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub instruments: InstrumentsConfig,
    pub risk: RiskConfig,
    pub strategy: StrategyConfig,
    pub execution: ExecutionConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Loads `.env` (if present) then reads environment variables, validating the aggregate
    /// before returning it. All sub-config errors are collected into one report.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            exchange: ExchangeConfig::from_env(),
            instruments: InstrumentsConfig::from_env(),
            risk: RiskConfig::from_env(),
            strategy: StrategyConfig::from_env(),
            execution: ExecutionConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
        };

        let mut errors = Vec::new();
        errors.extend(config.exchange.validate());
        errors.extend(config.instruments.validate());
        errors.extend(config.risk.validate());
        errors.extend(config.strategy.validate());
        errors.extend(config.execution.validate());
        errors.extend(config.observability.validate());

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_multiple_violations_into_one_report() {
        std::env::set_var("BINANCE_API_KEY", "");
        std::env::set_var("BINANCE_SECRET_KEY", "");
        std::env::set_var("TRADING_SYMBOLS", "btc");
        std::env::set_var("RISK_DAILY_LOSS_CAP_PERCENT", "5");

        let result = Config::from_env();
        assert!(result.is_err());
        if let Err(ConfigError::Invalid(errors)) = result {
            assert!(errors.len() >= 3);
        }

        std::env::remove_var("BINANCE_API_KEY");
        std::env::remove_var("BINANCE_SECRET_KEY");
        std::env::remove_var("TRADING_SYMBOLS");
        std::env::remove_var("RISK_DAILY_LOSS_CAP_PERCENT");
    }
}
