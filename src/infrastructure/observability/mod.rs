//! Observability: structured logging, a Prometheus metrics registry, and a push-based reporter
//! that periodically logs an account/risk snapshot as JSON. No HTTP server runs by default —
//! scraping happens off whatever bind address the deployment wires to [`Metrics::render`].

pub mod logging;
pub mod metrics;
pub mod reporter;

pub use logging::init_tracing;
pub use metrics::Metrics;
pub use reporter::{AccountSnapshot, MetricsReporter, MetricsSource, PositionSnapshotEntry};
