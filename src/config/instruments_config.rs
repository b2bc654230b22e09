use std::env;

/// The traded symbol universe, in exchange-wire form (e.g. `BTCUSDT`).
#[derive(Debug, Clone)]
pub struct InstrumentsConfig {
    pub symbols: Vec<String>,
}

impl InstrumentsConfig {
    pub fn from_env() -> Self {
        let raw = env::var("TRADING_SYMBOLS").unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string());
        let symbols = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { symbols }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.symbols.is_empty() {
            errors.push("TRADING_SYMBOLS must list at least one instrument".to_string());
        }
        for symbol in &self.symbols {
            let len_ok = (6..=12).contains(&symbol.len());
            let upper_ok = symbol.chars().all(|c| c.is_ascii_uppercase());
            if !len_ok || !upper_ok {
                errors.push(format!(
                    "invalid symbol '{}': must be 6-12 uppercase letters",
                    symbol
                ));
            }
        }
        errors
    }
}
