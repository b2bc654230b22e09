//! Order Lifecycle: closes a live position with a single opposite-side market order and reports
//! the realised outcome.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info};
use uuid::Uuid;

use crate::application::execution::poller::OrderStatusPoller;
use crate::config::ExecutionConfig;
use crate::domain::errors::ExecutionError;
use crate::domain::ports::ExchangeGateway;
use crate::domain::trading::portfolio::Position;
use crate::domain::trading::types::{CloseReason, OrderSide, OrderType};

const EMERGENCY_TIMEOUT_SECONDS: u64 = 30;

/// Outcome of closing a position, whether in full or in part.
#[derive(Debug, Clone)]
pub struct ClosureResult {
    pub position_id: String,
    pub reason: CloseReason,
    pub exit_price: Decimal,
    pub closed_quantity: Decimal,
    pub realised_pnl: Decimal,
    pub fully_closed: bool,
}

pub struct OrderLifecycle {
    gateway: Arc<dyn ExchangeGateway>,
    poller: OrderStatusPoller,
}

impl OrderLifecycle {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: &ExecutionConfig) -> Self {
        let poller = OrderStatusPoller::new(gateway.clone(), config);
        Self { gateway, poller }
    }

    /// Submits a MARKET order on the opposite side of `position` for its full quantity and
    /// awaits a fill. `emergency=true` shortens the poll budget so a liquidation sweep does not
    /// stall on a single unresponsive order.
    pub async fn close_position(
        &self,
        position: &Position,
        reason: CloseReason,
        emergency: bool,
    ) -> Result<ClosureResult, ExecutionError> {
        let closing_side = position.side.opposite();
        let client_order_id = Uuid::new_v4().to_string();

        let ack = self
            .gateway
            .place_order(&position.symbol, closing_side, OrderType::Market, position.quantity, None, &client_order_id)
            .await?;

        let timeout_override = if emergency { Some(Duration::from_secs(EMERGENCY_TIMEOUT_SECONDS)) } else { None };
        let report = self
            .poller
            .wait_for_fill(&position.symbol, &ack.exchange_order_id, timeout_override)
            .await
            .map_err(|err| ExecutionError::ClosureFailed { position_id: position.id.clone(), reason: err.to_string() })?;

        let exit_price = report.average_fill_price.unwrap_or(position.entry_price);
        let closed_quantity = if report.filled_quantity > Decimal::ZERO { report.filled_quantity } else { position.quantity };
        let fully_closed = closed_quantity >= position.quantity;

        let gross_pnl = match position.side {
            OrderSide::Buy => (exit_price - position.entry_price) * closed_quantity,
            OrderSide::Sell => (position.entry_price - exit_price) * closed_quantity,
        };
        // Entry fees were already booked against the portfolio when the position was opened.
        let realised_pnl = gross_pnl - report.fees;

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            ?reason,
            %exit_price,
            %realised_pnl,
            fully_closed,
            "position closed"
        );

        Ok(ClosureResult { position_id: position.id.clone(), reason, exit_price, closed_quantity, realised_pnl, fully_closed })
    }
}

impl OrderLifecycle {
    /// Convenience used by the emergency controller: closes with a best-effort log on failure
    /// instead of propagating, since a liquidation sweep must not abort on one bad order.
    pub async fn close_position_best_effort(&self, position: &Position, reason: CloseReason) -> Option<ClosureResult> {
        match self.close_position(position, reason, true).await {
            Ok(result) => Some(result),
            Err(err) => {
                error!(position_id = %position.id, error = %err, "emergency closure failed");
                None
            }
        }
    }
}
