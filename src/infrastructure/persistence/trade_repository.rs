use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::domain::repositories::{ClosedTrade, TradeRepository};
use crate::domain::trading::types::{CloseReason, OrderSide};

pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn append(&self, trade: &ClosedTrade) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO closed_trades
                (id, symbol, strategy_name, side, entry_price, exit_price, quantity,
                 realised_pnl, fees, opened_at, closed_at, close_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.symbol)
        .bind(&trade.strategy_name)
        .bind(side_to_str(trade.side))
        .bind(trade.entry_price.to_string())
        .bind(trade.exit_price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.realised_pnl.to_string())
        .bind(trade.fees.to_string())
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.to_rfc3339())
        .bind(close_reason_to_str(&trade.close_reason))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_symbol(&self, symbol: &str) -> anyhow::Result<Vec<ClosedTrade>> {
        let rows = sqlx::query(
            "SELECT * FROM closed_trades WHERE symbol = ?1 ORDER BY closed_at DESC",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_trade).collect()
    }

    async fn find_recent(&self, limit: usize) -> anyhow::Result<Vec<ClosedTrade>> {
        let rows = sqlx::query("SELECT * FROM closed_trades ORDER BY closed_at DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_trade).collect()
    }

    async fn all(&self) -> anyhow::Result<Vec<ClosedTrade>> {
        let rows = sqlx::query("SELECT * FROM closed_trades ORDER BY closed_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_trade).collect()
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<ClosedTrade> {
    let opened_at: String = row.try_get("opened_at")?;
    let closed_at: String = row.try_get("closed_at")?;
    Ok(ClosedTrade {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        strategy_name: row.try_get("strategy_name")?,
        side: side_from_str(&row.try_get::<String, _>("side")?)?,
        entry_price: parse_decimal(&row.try_get::<String, _>("entry_price")?)?,
        exit_price: parse_decimal(&row.try_get::<String, _>("exit_price")?)?,
        quantity: parse_decimal(&row.try_get::<String, _>("quantity")?)?,
        realised_pnl: parse_decimal(&row.try_get::<String, _>("realised_pnl")?)?,
        fees: parse_decimal(&row.try_get::<String, _>("fees")?)?,
        opened_at: DateTime::parse_from_rfc3339(&opened_at)?.with_timezone(&Utc),
        closed_at: DateTime::parse_from_rfc3339(&closed_at)?.with_timezone(&Utc),
        close_reason: close_reason_from_str(&row.try_get::<String, _>("close_reason")?)?,
    })
}

fn parse_decimal(raw: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| anyhow::anyhow!("invalid decimal {raw}: {e}"))
}

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn side_from_str(raw: &str) -> anyhow::Result<OrderSide> {
    match raw {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(anyhow::anyhow!("unknown order side {other}")),
    }
}

fn close_reason_to_str(reason: &CloseReason) -> &'static str {
    match reason {
        CloseReason::StopLoss => "STOP_LOSS",
        CloseReason::TakeProfit => "TAKE_PROFIT",
        CloseReason::MaxAge => "MAX_AGE",
        CloseReason::Adverse => "ADVERSE",
        CloseReason::Emergency => "EMERGENCY",
        CloseReason::Manual => "MANUAL",
    }
}

fn close_reason_from_str(raw: &str) -> anyhow::Result<CloseReason> {
    Ok(match raw {
        "STOP_LOSS" => CloseReason::StopLoss,
        "TAKE_PROFIT" => CloseReason::TakeProfit,
        "MAX_AGE" => CloseReason::MaxAge,
        "ADVERSE" => CloseReason::Adverse,
        "EMERGENCY" => CloseReason::Emergency,
        "MANUAL" => CloseReason::Manual,
        other => return Err(anyhow::anyhow!("unknown close reason {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use chrono::Utc;

    async fn test_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_trade() -> ClosedTrade {
        ClosedTrade {
            id: "t-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            strategy_name: "institutional".to_string(),
            side: OrderSide::Buy,
            entry_price: Decimal::new(50_000, 0),
            exit_price: Decimal::new(51_000, 0),
            quantity: Decimal::new(1, 1),
            realised_pnl: Decimal::new(100, 0),
            fees: Decimal::new(5, 0),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            close_reason: CloseReason::TakeProfit,
        }
    }

    #[tokio::test]
    async fn append_and_find_round_trips_a_trade() {
        let db = test_db().await;
        let repo = SqliteTradeRepository::new(db.pool.clone());
        let trade = sample_trade();
        repo.append(&trade).await.unwrap();

        let found = repo.find_by_symbol("BTCUSDT").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "t-1");
        assert_eq!(found[0].realised_pnl, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn append_is_idempotent_on_id() {
        let db = test_db().await;
        let repo = SqliteTradeRepository::new(db.pool.clone());
        let trade = sample_trade();
        repo.append(&trade).await.unwrap();
        repo.append(&trade).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn find_recent_respects_limit() {
        let db = test_db().await;
        let repo = SqliteTradeRepository::new(db.pool.clone());
        for i in 0..3 {
            let mut trade = sample_trade();
            trade.id = format!("t-{i}");
            repo.append(&trade).await.unwrap();
        }
        let recent = repo.find_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
