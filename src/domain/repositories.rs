//! Repository pattern abstractions for optional persistence.
//!
//! The control plane never requires these to be backed by real storage: absence is logged and
//! tolerated at startup (state is re-derived from the exchange). They exist so the Optimization
//! Agent and post-hoc audits have a durable, idempotent record to read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::trading::types::CloseReason;

/// A completed, closed trade — the unit the Optimization Agent reasons about.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub side: crate::domain::trading::types::OrderSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub realised_pnl: Decimal,
    pub fees: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub close_reason: CloseReason,
}

/// Persists and retrieves completed trades. Append must be idempotent on `id`.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn append(&self, trade: &ClosedTrade) -> anyhow::Result<()>;
    async fn find_by_symbol(&self, symbol: &str) -> anyhow::Result<Vec<ClosedTrade>>;
    async fn find_recent(&self, limit: usize) -> anyhow::Result<Vec<ClosedTrade>>;
    async fn all(&self) -> anyhow::Result<Vec<ClosedTrade>>;
}
