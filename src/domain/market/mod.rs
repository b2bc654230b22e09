//! Indicator library: pure, side-effect-free functions over candle/book/trade history.
//!
//! Nothing in this module talks to the network or holds a clock. Callers (the Strategy Engine,
//! the Risk Manager) own the history buffers and call these functions fresh each cycle.

pub mod cvd;
pub mod microstructure;
pub mod order_book_metrics;
pub mod supply_demand;
pub mod volume_profile;

pub use cvd::{CvdDivergence, CvdSeries, CvdTrend};
pub use microstructure::{MicrostructureMetrics, SlippageEstimate, SpreadQuality};
pub use order_book_metrics::{BookImbalance, LiquidityQuality};
pub use supply_demand::{Zone, ZoneType};
pub use volume_profile::VolumeProfile;
