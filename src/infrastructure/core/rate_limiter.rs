//! Token-bucket rate limiter guarding the exchange's three independent budgets: request weight
//! per minute, orders per second, and orders per day. Only the daily order cap rejects; the
//! other two budgets throttle by sleeping the caller.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::errors::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u64,
    pub orders_per_second: u64,
    pub orders_per_day: u64,
    pub burst_allowance: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 1200,
            orders_per_second: 10,
            orders_per_day: 100_000,
            burst_allowance: 0.8,
        }
    }
}

struct State {
    weight_window: VecDeque<(Instant, u64)>,
    current_weight: u64,
    order_times: VecDeque<Instant>,
    daily_order_count: u64,
    daily_reset_at: Instant,
}

/// Sliding-window token bucket. Request weight and order-per-second windows are one minute and
/// one second respectively; the daily order counter resets every 24 hours.
pub struct RateLimiter {
    max_weight_per_minute: u64,
    max_orders_per_second: u64,
    max_orders_per_day: u64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            max_weight_per_minute: scale(config.requests_per_minute, config.burst_allowance),
            max_orders_per_second: scale(config.orders_per_second, config.burst_allowance),
            max_orders_per_day: scale(config.orders_per_day, config.burst_allowance),
            state: Mutex::new(State {
                weight_window: VecDeque::new(),
                current_weight: 0,
                order_times: VecDeque::new(),
                daily_order_count: 0,
                daily_reset_at: Instant::now(),
            }),
        }
    }

    /// Blocks until `weight` request-weight budget and, if `is_order`, the per-second order
    /// budget are available. Returns an error only when the daily order cap has been reached.
    pub async fn acquire(&self, weight: u64, is_order: bool) -> Result<(), GatewayError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                clean_old_entries(&mut state, now);

                if is_order {
                    check_daily_reset(&mut state, now);
                    if state.daily_order_count >= self.max_orders_per_day {
                        return Err(GatewayError::RateLimitedDailyCap {
                            used: state.daily_order_count,
                            cap: self.max_orders_per_day,
                        });
                    }
                }

                if state.current_weight + weight > self.max_weight_per_minute {
                    let wait = weight_wait_time(&state, now);
                    if wait > Duration::ZERO {
                        warn!(
                            weight = state.current_weight,
                            max = self.max_weight_per_minute,
                            "rate limiter: request weight budget exhausted, waiting"
                        );
                        Some(wait)
                    } else {
                        None
                    }
                } else if is_order {
                    let recent_orders =
                        state.order_times.iter().filter(|t| now.duration_since(**t) < Duration::from_secs(1)).count() as u64;
                    if recent_orders >= self.max_orders_per_second {
                        let wait = state
                            .order_times
                            .front()
                            .map(|oldest| Duration::from_secs(1).saturating_sub(now.duration_since(*oldest)))
                            .unwrap_or(Duration::from_secs(1));
                        Some(wait)
                    } else {
                        None
                    }
                } else {
                    None
                }
            };

            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => break,
            }
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.weight_window.push_back((now, weight));
        state.current_weight += weight;
        if is_order {
            state.order_times.push_back(now);
            state.daily_order_count += 1;
        }
        Ok(())
    }
}

fn scale(limit: u64, burst_allowance: f64) -> u64 {
    ((limit as f64) * burst_allowance) as u64
}

fn clean_old_entries(state: &mut State, now: Instant) {
    let weight_cutoff = Duration::from_secs(60);
    while let Some((ts, _)) = state.weight_window.front() {
        if now.duration_since(*ts) >= weight_cutoff {
            let (_, weight) = state.weight_window.pop_front().unwrap();
            state.current_weight = state.current_weight.saturating_sub(weight);
        } else {
            break;
        }
    }

    let order_cutoff = Duration::from_secs(1);
    while let Some(ts) = state.order_times.front() {
        if now.duration_since(*ts) >= order_cutoff {
            state.order_times.pop_front();
        } else {
            break;
        }
    }
}

fn weight_wait_time(state: &State, now: Instant) -> Duration {
    match state.weight_window.front() {
        Some((oldest, _)) => Duration::from_secs(60).saturating_sub(now.duration_since(*oldest)),
        None => Duration::ZERO,
    }
}

fn check_daily_reset(state: &mut State, now: Instant) {
    if now.duration_since(state.daily_reset_at) >= Duration::from_secs(86_400) {
        state.daily_order_count = 0;
        state.daily_reset_at = now;
    }
}
