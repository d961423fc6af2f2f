/*
[INPUT]:  Instrument names and currency filters
[OUTPUT]: Order books and instrument definitions
[POS]:    HTTP layer - public market data methods (no auth required)
[UPDATE]: When adding new public methods or changing response format
*/

use crate::error::Result;
use crate::http::DeribitClient;
use crate::types::{Instrument, InstrumentKind, InstrumentsRequest, OrderBook, OrderBookRequest};

impl DeribitClient {
    /// `public/get_order_book`
    pub async fn get_order_book(&self, instrument_name: &str, depth: Option<u32>) -> Result<OrderBook> {
        let params = OrderBookRequest {
            instrument_name: instrument_name.to_string(),
            depth,
        };
        self.call("public/get_order_book", params, false).await
    }

    /// `public/get_instruments`, active instruments only
    pub async fn get_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
    ) -> Result<Vec<Instrument>> {
        let params = InstrumentsRequest {
            currency: currency.to_string(),
            kind,
            expired: false,
        };
        self.call("public/get_instruments", params, false).await
    }
}
