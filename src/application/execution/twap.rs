//! TWAP Executor: splits a large order into equal time-spaced chunks so it does not walk the
//! book further than necessary, aborting early if conditions turn adverse mid-execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::execution::poller::OrderStatusPoller;
use crate::config::ExecutionConfig;
use crate::domain::errors::ExecutionError;
use crate::domain::market::microstructure;
use crate::domain::ports::ExchangeGateway;
use crate::domain::trading::types::{OrderSide, OrderType};

/// One submitted-and-settled slice of the overall TWAP order.
#[derive(Debug, Clone)]
pub struct ChildOrder {
    pub exchange_order_id: String,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fees: Decimal,
}

/// The aggregated outcome of a TWAP run, whether it ran to completion or stopped early.
#[derive(Debug, Clone)]
pub struct TwapResult {
    pub child_orders: Vec<ChildOrder>,
    pub total_filled: Decimal,
    pub average_fill_price: Decimal,
    pub total_fees_quote: Decimal,
    pub realised_slippage_percent: Decimal,
    pub elapsed: Duration,
    pub stopped_early: bool,
    pub stop_reason: Option<String>,
}

/// A chunk plan computed from the order's total quantity and a reference price. Chunk count is
/// reduced from the configured default, down to a floor of 1, if the default would put any chunk
/// below the minimum tradable value.
struct Plan {
    num_chunks: u32,
    chunk_quantity: Decimal,
    last_chunk_quantity: Decimal,
}

impl Plan {
    fn build(total_quantity: Decimal, reference_price: Decimal, config: &ExecutionConfig) -> Self {
        let mut num_chunks = config.twap_default_num_chunks.max(1);
        loop {
            let chunk_quantity = total_quantity / Decimal::from(num_chunks);
            let chunk_value = chunk_quantity * reference_price;
            if chunk_value >= config.twap_min_chunk_value_quote || num_chunks <= 1 {
                let last_chunk_quantity = total_quantity - chunk_quantity * Decimal::from(num_chunks - 1);
                return Self { num_chunks, chunk_quantity, last_chunk_quantity };
            }
            num_chunks -= 1;
        }
    }

    fn quantity_for(&self, chunk_index: u32) -> Decimal {
        if chunk_index + 1 == self.num_chunks {
            self.last_chunk_quantity
        } else {
            self.chunk_quantity
        }
    }
}

pub struct TwapExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    poller: OrderStatusPoller,
    config: ExecutionConfig,
}

impl TwapExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: ExecutionConfig) -> Self {
        let poller = OrderStatusPoller::new(gateway.clone(), &config);
        Self { gateway, poller, config }
    }

    /// Executes `total_quantity` of `symbol` on `side` as a sequence of market chunks. Returns
    /// `Ok` with an aggregated result even when it stopped early — only a gateway error on the
    /// very first reference-price lookup is treated as a hard failure.
    pub async fn execute(&self, symbol: &str, side: OrderSide, total_quantity: Decimal) -> Result<TwapResult, ExecutionError> {
        let started_at = Instant::now();
        let reference_price = self.gateway.latest_price(symbol).await.map_err(ExecutionError::from)?;
        let plan = Plan::build(total_quantity, reference_price, &self.config);

        let mut child_orders = Vec::new();
        let mut stopped_early = false;
        let mut stop_reason = None;

        for chunk_index in 0..plan.num_chunks {
            let quantity = plan.quantity_for(chunk_index);

            if let Some(reason) = self.pre_chunk_check(symbol, quantity, reference_price).await {
                warn!(symbol, chunk_index, reason, "twap stopping early");
                stopped_early = true;
                stop_reason = Some(reason);
                break;
            }

            let client_order_id = Uuid::new_v4().to_string();
            let ack = match self
                .gateway
                .place_order(symbol, side, OrderType::Market, quantity, None, &client_order_id)
                .await
            {
                Ok(ack) => ack,
                Err(err) => {
                    warn!(symbol, chunk_index, error = %err, "twap chunk submission failed");
                    stopped_early = true;
                    stop_reason = Some(format!("order submission failed: {err}"));
                    break;
                }
            };

            let report = match self.poller.wait_for_fill(symbol, &ack.exchange_order_id, None).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(symbol, chunk_index, error = %err, "twap chunk fill tracking failed");
                    stopped_early = true;
                    stop_reason = Some(format!("fill tracking failed: {err}"));
                    break;
                }
            };

            child_orders.push(ChildOrder {
                exchange_order_id: ack.exchange_order_id,
                quantity,
                filled_quantity: report.filled_quantity,
                average_fill_price: report.average_fill_price,
                fees: report.fees,
            });

            if chunk_index + 1 < plan.num_chunks {
                tokio::time::sleep(Duration::from_secs(self.config.twap_interval_seconds)).await;
            }
        }

        info!(symbol, chunks = child_orders.len(), stopped_early, "twap execution finished");
        Ok(Self::aggregate(child_orders, reference_price, started_at.elapsed(), stopped_early, stop_reason))
    }

    /// Returns `Some(reason)` if the chunk should not be submitted.
    async fn pre_chunk_check(&self, symbol: &str, chunk_quantity: Decimal, reference_price: Decimal) -> Option<String> {
        let book = match self.gateway.order_book(symbol, 20).await {
            Ok(book) => book,
            Err(err) => return Some(format!("order book fetch failed: {err}")),
        };
        let metrics = microstructure::analyze(&book)?;

        let max_spread = Decimal::from_f64_retain(self.config.twap_max_spread_percent * 100.0).unwrap_or(Decimal::ZERO);
        if metrics.spread_percent > max_spread {
            return Some(format!("spread {} exceeds max {}", metrics.spread_percent, max_spread));
        }

        let current_price = match self.gateway.latest_price(symbol).await {
            Ok(price) => price,
            Err(err) => return Some(format!("price lookup failed: {err}")),
        };
        if reference_price > Decimal::ZERO {
            let deviation = ((current_price - reference_price) / reference_price).abs();
            let max_deviation =
                Decimal::from_f64_retain(self.config.twap_max_price_deviation_percent).unwrap_or(Decimal::ZERO);
            if deviation > max_deviation {
                return Some(format!("price deviation {deviation} exceeds max {max_deviation}"));
            }
        }

        let chunk_value = chunk_quantity * current_price;
        if chunk_value < self.config.twap_min_chunk_value_quote {
            return Some(format!(
                "chunk value {chunk_value} below minimum {}",
                self.config.twap_min_chunk_value_quote
            ));
        }

        None
    }

    fn aggregate(
        child_orders: Vec<ChildOrder>,
        reference_price: Decimal,
        elapsed: Duration,
        stopped_early: bool,
        stop_reason: Option<String>,
    ) -> TwapResult {
        let total_filled: Decimal = child_orders.iter().map(|c| c.filled_quantity).sum();
        let total_fees_quote: Decimal = child_orders.iter().map(|c| c.fees).sum();

        let average_fill_price = if total_filled > Decimal::ZERO {
            let weighted: Decimal = child_orders
                .iter()
                .map(|c| c.average_fill_price.unwrap_or(reference_price) * c.filled_quantity)
                .sum();
            weighted / total_filled
        } else {
            Decimal::ZERO
        };

        let realised_slippage_percent = if reference_price > Decimal::ZERO && average_fill_price > Decimal::ZERO {
            ((average_fill_price - reference_price) / reference_price).abs() * dec!(100)
        } else {
            Decimal::ZERO
        };

        TwapResult {
            child_orders,
            total_filled,
            average_fill_price,
            total_fees_quote,
            realised_slippage_percent,
            elapsed,
            stopped_early,
            stop_reason,
        }
    }
}
