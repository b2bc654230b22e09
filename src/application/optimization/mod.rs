//! Optimization Agent: advisory, offline, read-only over the trade history. Never runs from the
//! Orchestrator's hot path and never writes back into strategy weights or risk limits — it only
//! reads [`ClosedTrade`] records and emits [`Recommendation`]s for a human (or a future, separate
//! write path) to act on.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use statrs::statistics::{Data, Distribution};

use crate::domain::repositories::{ClosedTrade, TradeRepository};

fn underperforming_win_rate() -> f64 {
    0.40
}

/// Aggregate trade statistics for one (strategy, symbol) pair.
#[derive(Debug, Clone)]
pub struct StrategySymbolStats {
    pub strategy_name: String,
    pub symbol: String,
    pub trade_count: usize,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub expectancy: f64,
    pub max_consecutive_losses: u32,
    pub sharpe_like_ratio: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub strategy_name: String,
    pub symbol: String,
    pub message: String,
}

pub struct OptimizationAgent {
    repository: Arc<dyn TradeRepository>,
}

impl OptimizationAgent {
    pub fn new(repository: Arc<dyn TradeRepository>) -> Self {
        Self { repository }
    }

    /// Reads the full trade history and computes per-(strategy, symbol) statistics. A failure to
    /// read the store surfaces as an error here; it never propagates back into the control plane,
    /// since nothing in the hot path calls this agent.
    pub async fn analyze(&self) -> anyhow::Result<Vec<StrategySymbolStats>> {
        let trades = self.repository.all().await?;

        let mut grouped: HashMap<(String, String), Vec<ClosedTrade>> = HashMap::new();
        for trade in trades {
            grouped.entry((trade.strategy_name.clone(), trade.symbol.clone())).or_default().push(trade);
        }

        let mut stats: Vec<StrategySymbolStats> = grouped
            .into_iter()
            .map(|((strategy_name, symbol), mut trades)| {
                trades.sort_by_key(|t| t.closed_at);
                stats_for(strategy_name, symbol, &trades)
            })
            .collect();

        stats.sort_by(|a, b| (a.strategy_name.clone(), a.symbol.clone()).cmp(&(b.strategy_name.clone(), b.symbol.clone())));
        Ok(stats)
    }

    /// Analyzes the store and turns the result directly into advisory recommendations.
    pub async fn recommendations(&self) -> anyhow::Result<Vec<Recommendation>> {
        Ok(recommend(&self.analyze().await?))
    }
}

fn stats_for(strategy_name: String, symbol: String, trades: &[ClosedTrade]) -> StrategySymbolStats {
    let trade_count = trades.len();
    let pnls: Vec<f64> = trades.iter().filter_map(|t| t.realised_pnl.to_f64()).collect();

    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let win_rate = if trade_count > 0 { wins.len() as f64 / trade_count as f64 } else { 0.0 };
    let average_win = if wins.is_empty() { 0.0 } else { wins.iter().sum::<f64>() / wins.len() as f64 };
    let average_loss = if losses.is_empty() { 0.0 } else { losses.iter().sum::<f64>() / losses.len() as f64 };
    let expectancy = win_rate * average_win + (1.0 - win_rate) * average_loss;

    let max_consecutive_losses = pnls.iter().fold((0u32, 0u32), |(max, current), pnl| {
        if *pnl < 0.0 {
            let current = current + 1;
            (max.max(current), current)
        } else {
            (max, 0)
        }
    }).0;

    let sharpe_like_ratio = if pnls.len() >= 2 {
        let data = Data::new(pnls.clone());
        let mean = data.mean();
        let std_dev = data.std_dev();
        match (mean, std_dev) {
            (Some(mean), Some(std_dev)) if std_dev > 0.0 => Some(mean / std_dev),
            _ => None,
        }
    } else {
        None
    };

    StrategySymbolStats {
        strategy_name,
        symbol,
        trade_count,
        win_rate,
        average_win,
        average_loss,
        expectancy,
        max_consecutive_losses,
        sharpe_like_ratio,
    }
}

/// Pure function from stats to advisory text. Kept separate from `analyze` so it can be tested
/// and reasoned about without a repository.
pub fn recommend(stats: &[StrategySymbolStats]) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for s in stats {
        if s.trade_count < 10 {
            continue;
        }

        if s.expectancy < 0.0 {
            recommendations.push(Recommendation {
                strategy_name: s.strategy_name.clone(),
                symbol: s.symbol.clone(),
                message: format!(
                    "negative expectancy ({:.2}) on {} trades; consider reducing risk_per_trade for {}",
                    s.expectancy, s.trade_count, s.symbol
                ),
            });
        } else if s.win_rate < underperforming_win_rate() {
            recommendations.push(Recommendation {
                strategy_name: s.strategy_name.clone(),
                symbol: s.symbol.clone(),
                message: format!(
                    "win rate {:.0}% on {} underperforming over {} trades",
                    s.win_rate * 100.0,
                    s.symbol,
                    s.trade_count
                ),
            });
        }

        if s.max_consecutive_losses >= 5 {
            recommendations.push(Recommendation {
                strategy_name: s.strategy_name.clone(),
                symbol: s.symbol.clone(),
                message: format!("{} consecutive losses observed on {}; review stop placement", s.max_consecutive_losses, s.symbol),
            });
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::domain::trading::types::{CloseReason, OrderSide};

    struct InMemoryRepository {
        trades: Vec<ClosedTrade>,
    }

    #[async_trait]
    impl TradeRepository for InMemoryRepository {
        async fn append(&self, _trade: &ClosedTrade) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn find_by_symbol(&self, _symbol: &str) -> anyhow::Result<Vec<ClosedTrade>> {
            unimplemented!()
        }
        async fn find_recent(&self, _limit: usize) -> anyhow::Result<Vec<ClosedTrade>> {
            unimplemented!()
        }
        async fn all(&self) -> anyhow::Result<Vec<ClosedTrade>> {
            Ok(self.trades.clone())
        }
    }

    fn trade(pnl: Decimal) -> ClosedTrade {
        ClosedTrade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: "BTC/USDT".to_string(),
            strategy_name: "institutional_multi_factor".to_string(),
            side: OrderSide::Buy,
            entry_price: dec!(42_000),
            exit_price: dec!(42_000) + pnl,
            quantity: dec!(1),
            realised_pnl: pnl,
            fees: dec!(1),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            close_reason: CloseReason::TakeProfit,
        }
    }

    #[tokio::test]
    async fn computes_win_rate_and_expectancy_per_strategy_symbol() {
        let trades = vec![trade(dec!(100)), trade(dec!(100)), trade(dec!(-50))];
        let agent = OptimizationAgent::new(Arc::new(InMemoryRepository { trades }));

        let stats = agent.analyze().await.unwrap();
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.trade_count, 3);
        assert!((s.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(s.expectancy > 0.0);
    }

    #[tokio::test]
    async fn a_losing_streak_surfaces_a_recommendation() {
        let trades = (0..6).map(|_| trade(dec!(-10))).collect::<Vec<_>>();
        let agent = OptimizationAgent::new(Arc::new(InMemoryRepository { trades }));

        let stats = agent.analyze().await.unwrap();
        assert_eq!(stats[0].max_consecutive_losses, 6);

        let recs = recommend(&stats);
        assert!(recs.iter().any(|r| r.message.contains("consecutive losses")));
    }

    #[tokio::test]
    async fn a_healthy_strategy_gets_no_recommendations() {
        let trades = (0..10).map(|_| trade(dec!(100))).collect::<Vec<_>>();
        let agent = OptimizationAgent::new(Arc::new(InMemoryRepository { trades }));

        let stats = agent.analyze().await.unwrap();
        let recs = recommend(&stats);
        assert!(recs.is_empty());
    }

    #[test]
    fn a_small_sample_never_triggers_a_recommendation() {
        let stats = vec![StrategySymbolStats {
            strategy_name: "x".to_string(),
            symbol: "BTC/USDT".to_string(),
            trade_count: 3,
            win_rate: 0.0,
            average_win: 0.0,
            average_loss: -10.0,
            expectancy: -10.0,
            max_consecutive_losses: 3,
            sharpe_like_ratio: None,
        }];
        assert!(recommend(&stats).is_empty());
    }
}
