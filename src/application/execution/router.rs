//! Order Router: a pure classifier from order size and book quality to an execution strategy.
//! Holds no state and talks to nothing — every call is a function of its three inputs.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::ExecutionConfig;
use crate::domain::market::microstructure::SpreadQuality;
use crate::domain::market::order_book_metrics::LiquidityQuality;

const MIN_TWAP_SPLITS: u32 = 3;
const MAX_TWAP_SPLITS: u32 = 5;

/// The execution strategy a routed order should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Market,
    Limit,
    Twap { splits: u32 },
    Reject { reason: String },
}

/// Classifies an order by quote value and book quality. Poor liquidity always rejects regardless
/// of size; everything else falls out of the size thresholds in `config`.
pub fn route(
    quote_value: Decimal,
    liquidity: LiquidityQuality,
    spread: SpreadQuality,
    config: &ExecutionConfig,
) -> RoutingDecision {
    if liquidity == LiquidityQuality::Poor {
        return RoutingDecision::Reject { reason: "liquidity too poor to execute safely".to_string() };
    }

    if quote_value < config.small_order_threshold_quote {
        return RoutingDecision::Market;
    }

    let good_book = liquidity == LiquidityQuality::Good && spread != SpreadQuality::Poor;

    if quote_value <= config.large_order_threshold_quote || !good_book {
        return RoutingDecision::Limit;
    }

    let raw_splits = (quote_value / config.twap_chunk_target_quote).floor().to_u32().unwrap_or(0);
    let splits = raw_splits.clamp(MIN_TWAP_SPLITS, MAX_TWAP_SPLITS);
    RoutingDecision::Twap { splits }
}
