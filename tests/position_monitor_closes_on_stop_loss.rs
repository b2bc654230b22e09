//! A long position whose stop-loss is breached must be closed by the Position Monitor within
//! one check interval, with the position removed from the portfolio and a realised loss booked.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::sync::{watch, RwLock};

use common::{execution_config, risk_config, ScriptedGateway};
use spotcore::application::execution::OrderLifecycle;
use spotcore::application::monitor::{MonitorSettings, PositionMonitor};
use spotcore::application::risk::RiskManager;
use spotcore::domain::ports::ExchangeGateway;
use spotcore::domain::trading::portfolio::Position;
use spotcore::domain::trading::types::OrderSide;

#[tokio::test]
async fn stop_loss_breach_closes_the_position_and_books_the_loss() {
    // Entry 42,000, stop 41,160 (2% risk). The gateway reports the current mark at 41,000 (past
    // the stop) and fills the closing market order at the same price.
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(ScriptedGateway::new(dec!(100_000), dec!(41_000)));
    let lifecycle = Arc::new(OrderLifecycle::new(gateway.clone(), &execution_config()));
    let risk = Arc::new(RwLock::new(RiskManager::new(risk_config(), execution_config())));

    risk.write().await.add_position(Position {
        id: "p1".to_string(),
        symbol: "BTC/USDT".to_string(),
        side: OrderSide::Buy,
        entry_price: dec!(42_000),
        quantity: dec!(0.1),
        stop_loss: Some(dec!(41_160)),
        take_profit: Some(dec!(43_680)),
        trailing_stop_percent: None,
        max_favourable_price: None,
        opened_at: Utc::now(),
    });
    assert_eq!(risk.read().await.portfolio().position_count(), 1);

    let settings = MonitorSettings { check_interval: Duration::from_millis(20), ..MonitorSettings::default() };
    let monitor = Arc::new(PositionMonitor::new(gateway, lifecycle, risk.clone(), None, settings));

    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor_for_task = monitor.clone();
    let handle = tokio::spawn(async move { monitor_for_task.run(stop_rx).await });

    tokio::time::sleep(Duration::from_millis(80)).await;
    let _ = stop_tx.send(true);
    handle.await.unwrap();

    assert_eq!(risk.read().await.portfolio().position_count(), 0, "position should be closed within one check interval");
}
