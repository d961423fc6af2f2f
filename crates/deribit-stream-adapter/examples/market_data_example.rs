/*
[INPUT]:  Instrument name (e.g., "BTC-PERPETUAL")
[OUTPUT]: Order book and instrument list from the public REST API
[POS]:    Examples - public market data queries
[UPDATE]: When adding new public methods
*/

use deribit_stream_adapter::*;

/// Example: Query market data (no authentication required)
#[tokio::main]
async fn main() {
    println!("=== Deribit Market Data Example ===\n");

    let client = match DeribitClient::new() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };
    println!("✓ HTTP client created (no auth required for public methods)\n");

    let instrument = "BTC-PERPETUAL";

    println!("Querying order book for {}...", instrument);
    match client.get_order_book(instrument, Some(5)).await {
        Ok(book) => println!(
            "✓ Best bid: {:?}, best ask: {:?}, spread: {:?}",
            book.best_bid_price,
            book.best_ask_price,
            book.spread()
        ),
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\nQuerying BTC futures...");
    match client.get_instruments("BTC", Some(InstrumentKind::Future)).await {
        Ok(instruments) => {
            for instrument in instruments {
                println!("  {} (tick {})", instrument.instrument_name, instrument.tick_size);
            }
        }
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\n{}", client.latency().report());
    println!("✓ Market data example complete");
}
