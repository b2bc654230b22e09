use std::env;

/// Exchange credentials and connection endpoints. Populated from environment variables, never
/// logged in full — see `infrastructure::observability` for the redaction helper.
#[derive(Clone)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    pub testnet: bool,
    pub base_url: String,
    pub ws_url: String,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("testnet", &self.testnet)
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

const MIN_CREDENTIAL_LEN: usize = 20;

impl ExchangeConfig {
    pub fn from_env() -> Self {
        let testnet = env::var("EXCHANGE_TESTNET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let default_base = if testnet { "https://testnet.binance.vision" } else { "https://api.binance.com" };
        let default_ws = if testnet { "wss://testnet.binance.vision" } else { "wss://stream.binance.com:9443" };

        Self {
            api_key: env::var("BINANCE_API_KEY").unwrap_or_default(),
            secret_key: env::var("BINANCE_SECRET_KEY").unwrap_or_default(),
            testnet,
            base_url: env::var("BINANCE_BASE_URL").unwrap_or_else(|_| default_base.to_string()),
            ws_url: env::var("BINANCE_WS_URL").unwrap_or_else(|_| default_ws.to_string()),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let min_len = if self.testnet { 0 } else { MIN_CREDENTIAL_LEN };
        if self.api_key.is_empty() || self.api_key.len() < min_len {
            errors.push(format!("BINANCE_API_KEY must be at least {} characters", min_len));
        }
        if self.secret_key.is_empty() || self.secret_key.len() < min_len {
            errors.push(format!("BINANCE_SECRET_KEY must be at least {} characters", min_len));
        }
        if self.api_key == "changeme" || self.secret_key == "changeme" {
            errors.push("exchange credentials must not be placeholder values".to_string());
        }
        errors
    }
}
