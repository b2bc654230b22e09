//! Order Status Poller: waits for an order to reach a terminal state without blocking the caller
//! forever on a gateway that never responds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ExecutionConfig;
use crate::domain::errors::ExecutionError;
use crate::domain::ports::{ExchangeGateway, OrderStatusReport};
use crate::domain::trading::types::OrderStatus;

pub struct OrderStatusPoller {
    gateway: Arc<dyn ExchangeGateway>,
    poll_interval: Duration,
    timeout: Duration,
    max_consecutive_errors: u32,
}

impl OrderStatusPoller {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: &ExecutionConfig) -> Self {
        Self {
            gateway,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            timeout: Duration::from_secs(config.poll_timeout_seconds),
            max_consecutive_errors: config.poll_max_consecutive_errors,
        }
    }

    /// Polls until FILLED/CANCELLED/REJECTED/EXPIRED, an overrideable timeout elapses, or too
    /// many consecutive gateway errors occur. Returns immediately on PARTIALLY_FILLED — the
    /// caller decides whether to keep waiting. `timeout_override` lets emergency closures use a
    /// shorter budget than the configured default.
    pub async fn wait_for_fill(
        &self,
        symbol: &str,
        exchange_order_id: &str,
        timeout_override: Option<Duration>,
    ) -> Result<OrderStatusReport, ExecutionError> {
        let deadline_after = timeout_override.unwrap_or(self.timeout);
        let started_at = Instant::now();
        let mut consecutive_errors: u32 = 0;

        loop {
            match self.gateway.order_status(symbol, exchange_order_id).await {
                Ok(report) => {
                    consecutive_errors = 0;
                    if report.status.is_terminal() || report.status == OrderStatus::PartiallyFilled {
                        debug!(%exchange_order_id, status = ?report.status, "order poll reached a reportable state");
                        return Ok(report);
                    }
                }
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(%exchange_order_id, consecutive_errors, error = %err, "order status poll failed");
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(ExecutionError::StatusCheckFailed {
                            order_id: exchange_order_id.to_string(),
                            consecutive_errors,
                            reason: err.to_string(),
                        });
                    }
                }
            }

            if started_at.elapsed() >= deadline_after {
                if let Ok(report) = self.gateway.order_status(symbol, exchange_order_id).await {
                    warn!(%exchange_order_id, "order poll timed out but a final read succeeded");
                    return Ok(report);
                }
                return Err(ExecutionError::PollTimeout {
                    order_id: exchange_order_id.to_string(),
                    timeout_ms: deadline_after.as_millis() as u64,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
