//! Structured logging bootstrap, built on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Installs the global tracing subscriber. `log_level` is the default directive used when
/// `RUST_LOG` is unset (see [`crate::config::ObservabilityConfig`]).
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(stdout_layer).try_init()?;
    Ok(())
}
