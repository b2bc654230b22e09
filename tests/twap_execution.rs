//! End-to-end TWAP Executor scenarios against a scripted gateway: full completion and an
//! early abort triggered by a mid-execution price jump.

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{deep_book, execution_config, ScriptedGateway};
use spotcore::application::execution::TwapExecutor;
use spotcore::domain::trading::types::OrderSide;

#[tokio::test]
async fn a_well_behaved_market_completes_every_chunk() {
    let gateway = Arc::new(ScriptedGateway::new(dec!(100_000), dec!(42_000)));
    let executor = TwapExecutor::new(gateway, execution_config());

    let result = executor.execute("BTC/USDT", OrderSide::Buy, dec!(1)).await.unwrap();

    assert!(!result.stopped_early);
    assert_eq!(result.child_orders.len(), execution_config().twap_default_num_chunks as usize);
    assert_eq!(result.total_filled, dec!(0.1) * Decimal::from(result.child_orders.len() as u32));
}

#[tokio::test]
async fn a_price_jump_mid_execution_stops_the_twap_early() {
    let reference = dec!(42_000);
    let jumped = dec!(42_500); // +1.19%, past the 1% deviation cap

    let mut gateway = ScriptedGateway::new(dec!(100_000), reference);
    // Plan splits 1 BTC into 5 chunks of 0.2 each. `execute` reads the reference price once,
    // then `pre_chunk_check` reads it again before every chunk — so index 0 is the reference
    // lookup, index 1 covers chunk 0's check, index 2 chunk 1's, index 3 chunk 2's (the jump).
    gateway.prices = vec![reference, reference, reference, jumped, jumped];
    gateway.books = vec![deep_book("BTC/USDT", reference - dec!(5), reference + dec!(5))];
    let gateway = Arc::new(gateway);

    let executor = TwapExecutor::new(gateway, execution_config());
    let result = executor.execute("BTC/USDT", OrderSide::Buy, dec!(1)).await.unwrap();

    assert!(result.stopped_early);
    assert_eq!(result.child_orders.len(), 2);
    assert_eq!(result.total_filled, dec!(0.2));
    let reason = result.stop_reason.expect("a stop reason must be recorded");
    assert!(reason.contains("deviation"), "unexpected stop reason: {reason}");
}
