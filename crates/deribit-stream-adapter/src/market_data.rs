/*
[INPUT]:  `book.*` and `trades.*` channel pushes
[OUTPUT]: Latest order book per instrument, best bid/ask summaries
[POS]:    Market data layer - cache and feed wiring on top of the WebSocket client
[UPDATE]: When adding cached channel kinds or changing summary extraction
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::ws::message::{BookUpdate, RequestId, TradeData};
use crate::ws::DeribitWebSocket;

pub const DEFAULT_INTERVAL: &str = "100ms";

pub fn book_channel(instrument: &str) -> String {
    format!("book.{instrument}.{DEFAULT_INTERVAL}")
}

pub fn trades_channel(instrument: &str) -> String {
    format!("trades.{instrument}.{DEFAULT_INTERVAL}")
}

/// Most recent book payload received for one instrument
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub instrument: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn summary(&self) -> serde_json::Result<BookSummary> {
        BookSummary::from_payload(&self.payload)
    }
}

/// Timestamp and top of book of a book payload
#[derive(Debug, Clone, PartialEq)]
pub struct BookSummary {
    pub timestamp: i64,
    pub change_id: Option<i64>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

impl BookSummary {
    /// First bid and first ask level, in either level shape.
    pub fn from_payload(payload: &Value) -> serde_json::Result<Self> {
        let update = BookUpdate::deserialize(payload)?;
        Ok(Self {
            timestamp: update.timestamp,
            change_id: update.change_id,
            best_bid: update.bids.first().map(|level| level.price),
            best_ask: update.asks.first().map(|level| level.price),
        })
    }
}

impl fmt::Display for BookSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn side(price: Option<Decimal>) -> String {
            price.map_or_else(|| "none".to_string(), |p| p.to_string())
        }
        write!(
            f,
            "Timestamp: {}, Best bid: {}, Best ask: {}",
            self.timestamp,
            side(self.best_bid),
            side(self.best_ask)
        )
    }
}

/// Instrument -> latest book snapshot, last write wins
#[derive(Debug, Default)]
pub struct MarketDataCache {
    books: Mutex<HashMap<String, OrderBookSnapshot>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the snapshot for `instrument`.
    pub fn update(&self, instrument: impl Into<String>, payload: Value) {
        let instrument = instrument.into();
        let snapshot = OrderBookSnapshot {
            instrument: instrument.clone(),
            payload,
            received_at: Utc::now(),
        };
        self.books.lock().insert(instrument, snapshot);
    }

    pub fn get(&self, instrument: &str) -> Option<OrderBookSnapshot> {
        self.books.lock().get(instrument).cloned()
    }

    pub fn instruments(&self) -> Vec<String> {
        let mut instruments: Vec<_> = self.books.lock().keys().cloned().collect();
        instruments.sort();
        instruments
    }

    pub fn len(&self) -> usize {
        self.books.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wires book and trade channels of a `DeribitWebSocket` into a cache.
#[derive(Debug)]
pub struct MarketDataFeed {
    ws: Arc<DeribitWebSocket>,
    cache: Arc<MarketDataCache>,
    trades_seen: Arc<AtomicU64>,
}

impl MarketDataFeed {
    pub fn new(ws: Arc<DeribitWebSocket>) -> Self {
        Self {
            ws,
            cache: Arc::new(MarketDataCache::new()),
            trades_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ws(&self) -> &Arc<DeribitWebSocket> {
        &self.ws
    }

    pub fn cache(&self) -> Arc<MarketDataCache> {
        self.cache.clone()
    }

    pub fn trades_seen(&self) -> u64 {
        self.trades_seen.load(Ordering::Relaxed)
    }

    /// Register the book handler for `instrument` without subscribing.
    pub fn watch_order_book(&self, instrument: &str) -> String {
        let channel = book_channel(instrument);
        let cache = self.cache.clone();
        let name = instrument.to_string();
        self.ws.register_handler(channel.clone(), move |data| {
            cache.update(name.clone(), data.clone());
            let summary = BookSummary::from_payload(data)?;
            info!(instrument = %name, %summary, "order book update");
            Ok(())
        });
        channel
    }

    /// Register the trades handler for `instrument` without subscribing.
    pub fn watch_trades(&self, instrument: &str) -> String {
        let channel = trades_channel(instrument);
        let counter = self.trades_seen.clone();
        let name = instrument.to_string();
        self.ws.register_handler(channel.clone(), move |data| {
            let trades: Vec<TradeData> = serde_json::from_value(data.clone())?;
            for trade in &trades {
                info!(
                    instrument = %name,
                    price = %trade.price,
                    amount = %trade.amount,
                    direction = %trade.direction,
                    "trade"
                );
            }
            counter.fetch_add(trades.len() as u64, Ordering::Relaxed);
            Ok(())
        });
        channel
    }

    pub fn subscribe_order_book(&self, instrument: &str) -> Result<RequestId> {
        let channel = self.watch_order_book(instrument);
        self.ws.subscribe(&channel)
    }

    pub fn subscribe_trades(&self, instrument: &str) -> Result<RequestId> {
        let channel = self.watch_trades(instrument);
        self.ws.subscribe(&channel)
    }

    pub fn latest_order_book(&self, instrument: &str) -> Option<OrderBookSnapshot> {
        self.cache.get(instrument)
    }
}
