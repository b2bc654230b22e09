//! Value objects and entities exchanged between the control-plane components.

pub mod portfolio;
pub mod types;

pub use portfolio::{Position, PortfolioState};
pub use types::*;
