use std::env;

/// Logging and metrics surface. Never includes credentials or anything else the exchange
/// config already redacts.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_bind_address: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            metrics_bind_address: env::var("METRICS_BIND_ADDRESS").ok(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !VALID_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "LOG_LEVEL '{}' is not one of {:?}",
                self.log_level, VALID_LEVELS
            ));
        }
        errors
    }
}
