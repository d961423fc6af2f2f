/*
[INPUT]:  Currency and instrument kind filters
[OUTPUT]: Open positions
[POS]:    HTTP layer - private account methods (bearer token required)
[UPDATE]: When adding account methods
*/

use crate::error::Result;
use crate::http::DeribitClient;
use crate::types::{InstrumentKind, Position, PositionsRequest};

impl DeribitClient {
    /// `private/get_positions`
    pub async fn get_positions(&self, currency: &str, kind: Option<InstrumentKind>) -> Result<Vec<Position>> {
        let params = PositionsRequest {
            currency: currency.to_string(),
            kind,
        };
        self.call("private/get_positions", params, true).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{ClientConfig, DeribitClient};
    use crate::types::PositionDirection;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_positions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "private/get_positions",
                "params": {"currency": "BTC"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [{
                    "instrument_name": "BTC-PERPETUAL",
                    "direction": "buy",
                    "size": 100,
                    "average_price": 50000.0,
                    "floating_profit_loss": 0.001,
                    "kind": "future"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DeribitClient::with_config(ClientConfig::default().with_base_url(server.uri()))
            .expect("client init");
        let positions = client.get_positions("BTC", None).await.expect("get_positions failed");

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].direction, PositionDirection::Buy);
        assert_eq!(positions[0].size, Decimal::from(100));
    }
}
