//! Binance combined-stream websocket adapter: depth, kline, and trade events for a subscribed
//! symbol set, reconnecting with exponential backoff on disconnect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::domain::errors::GatewayError;
use crate::domain::ports::{MarketEvent, MarketStream};
use crate::domain::trading::types::{Candle, OrderBook, TapeTrade, denormalize_crypto_symbol, normalize_crypto_symbol};

const MAX_BACKOFF_SECS: u64 = 60;
const PING_INTERVAL_SECS: u64 = 180;

pub struct BinanceMarketStream {
    ws_url: String,
}

impl BinanceMarketStream {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl MarketStream for BinanceMarketStream {
    async fn subscribe(&self, symbols: Vec<String>) -> Result<mpsc::Receiver<MarketEvent>, GatewayError> {
        if symbols.is_empty() {
            return Err(GatewayError::Authentication("cannot subscribe to an empty symbol list".to_string()));
        }
        let (tx, rx) = mpsc::channel(1000);
        let ws_url = self.ws_url.clone();

        tokio::spawn(async move {
            let mut backoff = 1u64;
            loop {
                match run_stream(&ws_url, &symbols, &tx).await {
                    Ok(()) => {
                        info!("Binance market stream closed gracefully, reconnecting");
                        backoff = 1;
                    }
                    Err(e) => {
                        error!(error = %e, backoff_secs = backoff, "Binance market stream error, reconnecting");
                        tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

async fn run_stream(ws_url: &str, symbols: &[String], tx: &mpsc::Sender<MarketEvent>) -> anyhow::Result<()> {
    let streams: Vec<String> = symbols
        .iter()
        .flat_map(|s| {
            let denorm = denormalize_crypto_symbol(s).to_lowercase();
            vec![format!("{}@depth20@100ms", denorm), format!("{}@kline_1m", denorm), format!("{}@trade", denorm)]
        })
        .collect();

    let url = format!("{}/stream?streams={}", ws_url.trim_end_matches('/'), streams.join("/"));
    let (ws_stream, _) = connect_async(&url).await?;
    let (write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(100);
    let mut write = write;
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = out_tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(PING_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if ping_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_message(&text, tx).await {
                    debug!(error = %e, "ignoring unparseable stream message");
                }
            }
            Ok(Message::Ping(_)) => {
                let _ = out_tx.send(Message::Pong(Vec::new().into())).await;
            }
            Ok(Message::Close(frame)) => {
                info!(?frame, "Binance stream closed by server");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Binance stream read error");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    stream: String,
    data: serde_json::Value,
}

async fn handle_message(text: &str, tx: &mpsc::Sender<MarketEvent>) -> anyhow::Result<()> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let wire_symbol = envelope
        .stream
        .split('@')
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed stream name"))?
        .to_uppercase();

    let event = if envelope.stream.contains("@depth") {
        parse_depth(&wire_symbol, &envelope.data)?
    } else if envelope.stream.contains("@kline") {
        parse_kline(&envelope.data)?
    } else if envelope.stream.contains("@trade") {
        parse_trade(&envelope.data)?
    } else {
        return Ok(());
    };
    let _ = tx.send(event).await;
    Ok(())
}

fn parse_depth(wire_symbol: &str, data: &serde_json::Value) -> anyhow::Result<MarketEvent> {
    #[derive(Deserialize)]
    struct DepthPayload {
        bids: Vec<[String; 2]>,
        asks: Vec<[String; 2]>,
    }
    let payload: DepthPayload = serde_json::from_value(data.clone())?;
    let parse_level = |l: &[String; 2]| -> (Decimal, Decimal) {
        (l[0].parse().unwrap_or(Decimal::ZERO), l[1].parse().unwrap_or(Decimal::ZERO))
    };
    Ok(MarketEvent::Depth(OrderBook {
        symbol: normalize_crypto_symbol(wire_symbol).unwrap_or_else(|_| wire_symbol.to_string()),
        captured_at: Utc::now(),
        bids: payload.bids.iter().map(parse_level).collect(),
        asks: payload.asks.iter().map(parse_level).collect(),
    }))
}

fn parse_kline(data: &serde_json::Value) -> anyhow::Result<MarketEvent> {
    #[derive(Deserialize)]
    struct KlinePayload {
        s: String,
        k: KlineBody,
    }
    #[derive(Deserialize)]
    struct KlineBody {
        t: i64,
        o: String,
        h: String,
        l: String,
        c: String,
        v: String,
        n: u64,
    }
    let payload: KlinePayload = serde_json::from_value(data.clone())?;
    let open_time: DateTime<Utc> = DateTime::from_timestamp_millis(payload.k.t)
        .ok_or_else(|| anyhow::anyhow!("invalid kline open time"))?;
    Ok(MarketEvent::Candle(Candle {
        symbol: normalize_crypto_symbol(&payload.s).unwrap_or(payload.s),
        open_time,
        open: payload.k.o.parse()?,
        high: payload.k.h.parse()?,
        low: payload.k.l.parse()?,
        close: payload.k.c.parse()?,
        volume: payload.k.v.parse()?,
        trade_count: payload.k.n,
    }))
}

fn parse_trade(data: &serde_json::Value) -> anyhow::Result<MarketEvent> {
    #[derive(Deserialize)]
    struct TradePayload {
        s: String,
        p: String,
        q: String,
        m: bool,
        #[serde(rename = "T")]
        trade_time_ms: i64,
    }
    let payload: TradePayload = serde_json::from_value(data.clone())?;
    let timestamp = DateTime::from_timestamp_millis(payload.trade_time_ms).unwrap_or_else(Utc::now);
    Ok(MarketEvent::Trade {
        symbol: normalize_crypto_symbol(&payload.s).unwrap_or(payload.s),
        trade: TapeTrade {
            timestamp,
            price: payload.p.parse()?,
            quantity: payload.q.parse()?,
            buyer_is_maker: payload.m,
        },
    })
}
