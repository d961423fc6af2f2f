/*
[INPUT]:  Optional DERIBIT_CLIENT_ID / DERIBIT_CLIENT_SECRET environment variables
[OUTPUT]: Streamed order book summaries for BTC-PERPETUAL
[POS]:    Examples - WebSocket streaming
[UPDATE]: When changing the WebSocket client API
*/

use std::sync::Arc;
use std::time::Duration;

use deribit_stream_adapter::*;

fn main() {
    println!("=== Deribit WebSocket Example ===\n");

    let mut config = WsConfig::default();
    if let (Ok(id), Ok(secret)) = (
        std::env::var("DERIBIT_CLIENT_ID"),
        std::env::var("DERIBIT_CLIENT_SECRET"),
    ) {
        config = config.with_credentials(ClientCredentials::new(id, secret));
    }

    let ws = Arc::new(DeribitWebSocket::new(config));
    ws.set_connection_callback(|connected| {
        if connected {
            println!("WebSocket connected, ready for subscriptions");
        } else {
            println!("WebSocket disconnected");
        }
    });

    let feed = MarketDataFeed::new(ws.clone());
    feed.watch_order_book("BTC-PERPETUAL");

    if let Err(e) = ws.connect() {
        eprintln!("Failed to connect: {}", e);
        return;
    }
    if !ws.wait_for_ready(Duration::from_secs(10)) {
        eprintln!("Timed out waiting for the session");
        ws.disconnect();
        return;
    }

    if let Err(e) = ws.subscribe(&market_data::book_channel("BTC-PERPETUAL")) {
        eprintln!("Subscribe failed: {}", e);
    }

    std::thread::sleep(Duration::from_secs(10));

    if let Some(snapshot) = feed.latest_order_book("BTC-PERPETUAL") {
        match snapshot.summary() {
            Ok(summary) => println!("Latest book at {}: {}", snapshot.received_at, summary),
            Err(e) => println!("Latest book unreadable: {}", e),
        }
    }

    ws.disconnect();
    println!("\n{}", ws.latency().report());
}
