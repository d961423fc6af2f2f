/*
[INPUT]:  Runner configuration
[OUTPUT]: Connected WebSocket session streaming the configured feeds, REST snapshots, stats
[POS]:    Session layer - wires adapter clients together for the binary
[UPDATE]: When changing startup order, feed handling or the statistics report
*/

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use deribit_stream_adapter::{
    DeribitClient, DeribitWebSocket, LatencyRecorder, MarketDataFeed, RequestOutcome, TokenStore,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{FeedChannel, RunnerConfig};

/// One streaming session: WebSocket client, market data feed and REST client
/// sharing a token store and latency recorder.
pub struct StreamSession {
    ws: Arc<DeribitWebSocket>,
    feed: MarketDataFeed,
    rest: DeribitClient,
    channels: Vec<FeedChannel>,
    raw_counts: Arc<Mutex<BTreeMap<String, u64>>>,
    started_at: DateTime<Utc>,
}

impl StreamSession {
    pub fn new(config: &RunnerConfig) -> anyhow::Result<Self> {
        let tokens = TokenStore::new();
        let latency = Arc::new(LatencyRecorder::new());

        let ws = Arc::new(DeribitWebSocket::with_shared(
            config.ws_config(),
            tokens.clone(),
            latency.clone(),
        ));
        let rest = DeribitClient::with_shared(config.client_config(), tokens, latency)
            .context("build REST client")?;

        ws.set_request_observer(|intent, outcome| match outcome {
            RequestOutcome::Confirmed(_) => {}
            RequestOutcome::Rejected(err) => warn!(%intent, error = %err, "request rejected"),
            RequestOutcome::ConnectionLost => warn!(%intent, "request lost with connection"),
            RequestOutcome::TimedOut => warn!(%intent, "request timed out"),
        });

        Ok(Self {
            feed: MarketDataFeed::new(ws.clone()),
            ws,
            rest,
            channels: config.channels(),
            raw_counts: Arc::new(Mutex::new(BTreeMap::new())),
            started_at: Utc::now(),
        })
    }

    pub fn ws(&self) -> &Arc<DeribitWebSocket> {
        &self.ws
    }

    pub fn feed(&self) -> &MarketDataFeed {
        &self.feed
    }

    pub fn channels(&self) -> &[FeedChannel] {
        &self.channels
    }

    /// Cancel `shutdown` when the connection drops after having been open.
    pub fn cancel_on_disconnect(&self, shutdown: CancellationToken) {
        self.ws.set_connection_callback(move |connected| {
            if connected {
                info!("WebSocket connected, ready for subscriptions");
            } else {
                warn!("WebSocket disconnected");
                shutdown.cancel();
            }
        });
    }

    /// Register a handler for every configured channel. Safe before `start`.
    pub fn register_feeds(&self) {
        for channel in &self.channels {
            match channel {
                FeedChannel::Book { instrument, .. } => {
                    self.feed.watch_order_book(instrument);
                }
                FeedChannel::Trades { instrument, .. } => {
                    self.feed.watch_trades(instrument);
                }
                FeedChannel::Raw { channel } => {
                    let counts = self.raw_counts.clone();
                    let name = channel.clone();
                    self.ws.register_handler(channel.clone(), move |data| {
                        *counts.lock().entry(name.clone()).or_default() += 1;
                        info!(channel = %name, %data, "channel update");
                        Ok(())
                    });
                }
            }
        }
        info!(channels = self.channels.len(), "feed handlers registered");
    }

    /// Connect, wait for the session and subscribe every channel. Blocking.
    pub fn start(&self, ready_timeout: Duration) -> anyhow::Result<()> {
        self.ws.connect().context("start WebSocket client")?;
        if !self.ws.wait_for_ready(ready_timeout) {
            let state = self.ws.state();
            self.ws.disconnect();
            bail!("WebSocket session not ready after {ready_timeout:?} (state: {state})");
        }
        if let Some(token) = self.ws.token_store().token_data() {
            info!(expires_at = %token.expires_at, scope = ?token.scope, "session authenticated");
        }

        for channel in &self.channels {
            let name = channel.channel();
            if let Err(err) = self.ws.subscribe(name) {
                warn!(channel = %name, error = %err, "subscribe failed");
            }
        }
        Ok(())
    }

    /// Fetch a REST order book for each book feed and log its top of book.
    pub async fn fetch_snapshots(&self) {
        for channel in &self.channels {
            let FeedChannel::Book { instrument, .. } = channel else {
                continue;
            };
            match self.rest.get_order_book(instrument, Some(1)).await {
                Ok(book) => info!(
                    %instrument,
                    best_bid = ?book.best_bid_price,
                    best_ask = ?book.best_ask_price,
                    mark = ?book.mark_price,
                    "REST order book snapshot"
                ),
                Err(err) => warn!(%instrument, error = %err, "REST order book failed"),
            }
        }
    }

    /// Latency statistics plus per-feed counters
    pub fn stats_report(&self) -> String {
        let mut report = self.ws.latency().report();
        let uptime = Utc::now() - self.started_at;

        report.push_str(&format!("\nSession uptime: {}s\n", uptime.num_seconds()));
        report.push_str(&format!(
            "Order books cached: {}\n",
            self.feed.cache().len()
        ));
        report.push_str(&format!("Trades received: {}\n", self.feed.trades_seen()));
        for (channel, count) in self.raw_counts.lock().iter() {
            report.push_str(&format!("{channel}: {count} updates\n"));
        }
        report.push_str(&format!(
            "Pending requests: {}\n",
            self.ws.pending_requests()
        ));
        report
    }

    /// Close the connection and join the I/O thread. Blocking.
    pub fn shutdown(&self) {
        self.ws.disconnect();
    }
}
