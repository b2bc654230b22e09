//! Out-of-band CLI for the Optimization Agent. Never runs from the control plane's hot path;
//! reads the trade store, prints stats and advisory recommendations, and exits.

use std::sync::Arc;

use clap::Parser;

use spotcore::application::optimization::{recommend, OptimizationAgent};
use spotcore::domain::repositories::TradeRepository;
use spotcore::infrastructure::observability::init_tracing;
use spotcore::infrastructure::persistence::{Database, SqliteTradeRepository};

#[derive(Parser)]
#[command(name = "optimize", about = "Advisory trade history analysis")]
struct Args {
    /// SQLite connection string; defaults to the same store the control plane writes to.
    #[arg(long, default_value = "sqlite://spotcore.db")]
    database_url: String,

    /// Only print recommendations, skipping the per-(strategy, symbol) statistics table.
    #[arg(long)]
    recommendations_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info")?;

    let database = Database::connect(&args.database_url).await?;
    let repository: Arc<dyn TradeRepository> = Arc::new(SqliteTradeRepository::new(database.pool.clone()));
    let agent = OptimizationAgent::new(repository);

    let stats = agent.analyze().await?;

    if !args.recommendations_only {
        if stats.is_empty() {
            println!("no closed trades on record");
        }
        for s in &stats {
            println!(
                "{} / {}: {} trades, win_rate={:.1}%, expectancy={:.4}, max_consecutive_losses={}, sharpe_like={}",
                s.strategy_name,
                s.symbol,
                s.trade_count,
                s.win_rate * 100.0,
                s.expectancy,
                s.max_consecutive_losses,
                s.sharpe_like_ratio.map(|r| format!("{r:.2}")).unwrap_or_else(|| "n/a".to_string()),
            );
        }
    }

    let recommendations = recommend(&stats);
    if recommendations.is_empty() {
        println!("no advisory recommendations");
    }
    for r in &recommendations {
        println!("[{} / {}] {}", r.strategy_name, r.symbol, r.message);
    }

    Ok(())
}
