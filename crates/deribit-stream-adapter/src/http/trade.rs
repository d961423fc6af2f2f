/*
[INPUT]:  Order parameters and order ids
[OUTPUT]: Order placement, amendment and cancellation results
[POS]:    HTTP layer - private trading methods (bearer token required)
[UPDATE]: When adding order types or changing trading method params
*/

use rust_decimal::Decimal;
use tracing::info;

use crate::error::Result;
use crate::http::DeribitClient;
use crate::types::{CancelOrderRequest, Direction, EditOrderRequest, Order, OrderRequest, OrderResponse};

impl DeribitClient {
    /// `private/buy` or `private/sell` depending on `direction`
    pub async fn place_order(&self, direction: Direction, request: &OrderRequest) -> Result<OrderResponse> {
        let response: OrderResponse = self.call(direction.order_method(), request, true).await?;
        info!(
            order_id = %response.order.order_id,
            instrument = %response.order.instrument_name,
            %direction,
            "order placed"
        );
        Ok(response)
    }

    pub async fn buy(&self, request: &OrderRequest) -> Result<OrderResponse> {
        self.place_order(Direction::Buy, request).await
    }

    pub async fn sell(&self, request: &OrderRequest) -> Result<OrderResponse> {
        self.place_order(Direction::Sell, request).await
    }

    /// `private/cancel`
    pub async fn cancel(&self, order_id: &str) -> Result<Order> {
        let params = CancelOrderRequest {
            order_id: order_id.to_string(),
        };
        let order: Order = self.call("private/cancel", params, true).await?;
        info!(order_id, state = ?order.order_state, "order cancelled");
        Ok(order)
    }

    /// `private/edit`
    pub async fn edit(&self, order_id: &str, amount: Decimal, price: Decimal) -> Result<OrderResponse> {
        let params = EditOrderRequest {
            order_id: order_id.to_string(),
            amount,
            price,
        };
        self.call("private/edit", params, true).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{ClientConfig, DeribitClient};
    use crate::types::{OrderRequest, OrderState};
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order_json(state: &str) -> Value {
        json!({
            "order_id": "BTC-1",
            "instrument_name": "BTC-PERPETUAL",
            "direction": "sell",
            "order_state": state,
            "order_type": "limit",
            "amount": 10,
            "price": 60000
        })
    }

    async fn client_with_token(server: &MockServer) -> DeribitClient {
        let client = DeribitClient::with_config(ClientConfig::default().with_base_url(server.uri()))
            .expect("client init");
        client.token_store().store(
            serde_json::from_value(json!({"access_token": "T", "expires_in": 900})).unwrap(),
        );
        client
    }

    #[tokio::test]
    async fn test_sell_uses_private_sell_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer T"))
            .and(body_partial_json(json!({
                "method": "private/sell",
                "params": {"instrument_name": "BTC-PERPETUAL", "amount": 10.0, "price": 60000.0, "type": "limit"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"order": order_json("open"), "trades": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with_token(&server).await;
        let request = OrderRequest::limit("BTC-PERPETUAL", Decimal::from(10), Decimal::from(60000));
        let response = client.sell(&request).await.expect("sell failed");
        assert_eq!(response.order.order_id, "BTC-1");
    }

    #[tokio::test]
    async fn test_cancel_returns_cancelled_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "private/cancel",
                "params": {"order_id": "BTC-1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": order_json("cancelled")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with_token(&server).await;
        let order = client.cancel("BTC-1").await.expect("cancel failed");
        assert_eq!(order.order_state, OrderState::Cancelled);
    }

    #[tokio::test]
    async fn test_edit_sends_new_price_and_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "private/edit",
                "params": {"order_id": "BTC-1", "amount": 20.0, "price": 61000.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"order": order_json("open")}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with_token(&server).await;
        let response = client
            .edit("BTC-1", Decimal::from(20), Decimal::from(61000))
            .await
            .expect("edit failed");
        assert!(response.trades.is_empty());
    }
}
