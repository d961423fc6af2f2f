/*
[INPUT]:  Deribit JSON-RPC `result` payloads
[OUTPUT]: Typed response structs with deserialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{Direction, InstrumentKind, OrderState, OrderType, PositionDirection};
use crate::ws::message::{BookLevel, TradeData};

/// Result of `public/get_order_book`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderBook {
    pub instrument_name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub change_id: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub best_bid_price: Option<Decimal>,
    #[serde(default)]
    pub best_bid_amount: Option<Decimal>,
    #[serde(default)]
    pub best_ask_price: Option<Decimal>,
    #[serde(default)]
    pub best_ask_amount: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub index_price: Option<Decimal>,
}

impl OrderBook {
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask_price? - self.best_bid_price?)
    }
}

/// One entry of `public/get_instruments`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Instrument {
    pub instrument_name: String,
    pub kind: InstrumentKind,
    pub base_currency: String,
    #[serde(default)]
    pub quote_currency: Option<String>,
    pub tick_size: Decimal,
    pub min_trade_amount: Decimal,
    #[serde(default)]
    pub contract_size: Option<Decimal>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub expiration_timestamp: Option<i64>,
    #[serde(default)]
    pub settlement_period: Option<String>,
}

/// One entry of `private/get_positions`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub instrument_name: String,
    pub direction: PositionDirection,
    pub size: Decimal,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub floating_profit_loss: Option<Decimal>,
    #[serde(default)]
    pub total_profit_loss: Option<Decimal>,
    #[serde(default)]
    pub kind: Option<InstrumentKind>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub order_id: String,
    pub instrument_name: String,
    pub direction: Direction,
    pub order_state: OrderState,
    pub order_type: OrderType,
    pub amount: Decimal,
    #[serde(default)]
    pub filled_amount: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<i64>,
    #[serde(default)]
    pub last_update_timestamp: Option<i64>,
}

/// Result of `private/buy`, `private/sell` and `private/edit`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    #[serde(default)]
    pub trades: Vec<TradeData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_book_accepts_nulls_and_levels() {
        let book: OrderBook = serde_json::from_value(json!({
            "instrument_name": "BTC-PERPETUAL",
            "timestamp": 1700000000000i64,
            "state": "open",
            "bids": [[50000.0, 10.0]],
            "asks": [[50001.5, 4.0]],
            "best_bid_price": 50000.0,
            "best_ask_price": 50001.5,
            "last_price": null
        }))
        .unwrap();

        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks[0].amount, Decimal::from(4));
        assert!(book.last_price.is_none());
        assert_eq!(book.spread(), Some("1.5".parse().unwrap()));
    }

    #[test]
    fn test_order_response_parses() {
        let response: OrderResponse = serde_json::from_value(json!({
            "order": {
                "order_id": "ETH-584849853",
                "instrument_name": "ETH-PERPETUAL",
                "direction": "buy",
                "order_state": "open",
                "order_type": "limit",
                "amount": 40,
                "filled_amount": 0,
                "price": 2000.5,
                "label": "runner"
            },
            "trades": []
        }))
        .unwrap();

        assert_eq!(response.order.order_id, "ETH-584849853");
        assert_eq!(response.order.order_state, OrderState::Open);
        assert!(response.trades.is_empty());
    }

    #[test]
    fn test_flat_position_direction() {
        let position: Position = serde_json::from_value(json!({
            "instrument_name": "BTC-PERPETUAL",
            "direction": "zero",
            "size": 0,
            "kind": "future"
        }))
        .unwrap();
        assert_eq!(position.direction, PositionDirection::Zero);
    }
}
