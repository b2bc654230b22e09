use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use spotcore::application::emergency::{EmergencyController, EmergencySettings};
use spotcore::application::execution::OrderLifecycle;
use spotcore::application::monitor::{MonitorSettings, PositionMonitor};
use spotcore::application::orchestrator::{Orchestrator, OrchestratorSettings};
use spotcore::application::risk::RiskManager;
use spotcore::config::Config;
use spotcore::domain::ports::{ExchangeGateway, MarketStream};
use spotcore::domain::repositories::TradeRepository;
use spotcore::infrastructure::exchange::{BinanceGateway, BinanceMarketStream};
use spotcore::infrastructure::observability::{init_tracing, Metrics, MetricsReporter};
use spotcore::infrastructure::persistence::{Database, SqliteTradeRepository};

const METRICS_PUSH_INTERVAL_SECONDS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().map_err(|err| anyhow::anyhow!("{err}"))?;
    init_tracing(&config.observability.log_level)?;
    info!(instruments = ?config.instruments.symbols, testnet = config.exchange.testnet, "starting");

    let database = match Database::connect(&database_url()).await {
        Ok(db) => Some(db),
        Err(err) => {
            warn!(error = %err, "persistence unavailable, continuing without it");
            None
        }
    };
    let trade_repository: Option<Arc<dyn TradeRepository>> =
        database.as_ref().map(|db| Arc::new(SqliteTradeRepository::new(db.pool.clone())) as Arc<dyn TradeRepository>);

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(BinanceGateway::new(
        config.exchange.api_key.clone(),
        config.exchange.secret_key.clone(),
        config.exchange.base_url.clone(),
    ));
    let stream: Option<Arc<dyn MarketStream>> = Some(Arc::new(BinanceMarketStream::new(config.exchange.ws_url.clone())));

    let risk = Arc::new(RwLock::new(RiskManager::new(config.risk.clone(), config.execution.clone())));
    let lifecycle = Arc::new(OrderLifecycle::new(gateway.clone(), &config.execution));
    let monitor = Arc::new(PositionMonitor::new(
        gateway.clone(),
        lifecycle.clone(),
        risk.clone(),
        trade_repository.clone(),
        MonitorSettings::default(),
    ));
    let emergency = Arc::new(EmergencyController::new(
        gateway.clone(),
        lifecycle,
        risk.clone(),
        trade_repository,
        EmergencySettings::default(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        gateway,
        stream,
        risk,
        monitor,
        emergency,
        OrchestratorSettings::default(),
    ));

    let metrics = Metrics::new()?;
    let reporter = MetricsReporter::new(orchestrator.clone(), metrics, METRICS_PUSH_INTERVAL_SECONDS);
    tokio::spawn(reporter.run());

    let (stop_tx, stop_rx) = watch::channel(false);
    let orchestrator_handle = tokio::spawn(orchestrator.run(stop_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = stop_tx.send(true);

    if let Err(err) = orchestrator_handle.await? {
        error!(error = %err, "orchestrator exited with an error");
    }

    if let Some(db) = database {
        db.pool.close().await;
    }

    Ok(())
}

fn database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://spotcore.db".to_string())
}
