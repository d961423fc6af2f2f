/*
[INPUT]:  Deribit JSON-RPC schema and serde requirements
[OUTPUT]: Typed request params with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::Serialize;

use super::enums::{InstrumentKind, OrderType, TimeInForce};

/// Params of `public/subscribe` and friends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelsParams {
    pub channels: Vec<String>,
}

impl ChannelsParams {
    pub fn single(channel: impl Into<String>) -> Self {
        Self {
            channels: vec![channel.into()],
        }
    }
}

/// Params of `private/buy` and `private/sell`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub instrument_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float_option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

impl OrderRequest {
    pub fn limit(instrument_name: impl Into<String>, amount: Decimal, price: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            amount,
            order_type: OrderType::Limit,
            price: Some(price),
            label: None,
            time_in_force: None,
            post_only: None,
            reduce_only: None,
        }
    }

    pub fn market(instrument_name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            price: None,
            order_type: OrderType::Market,
            ..Self::limit(instrument_name, amount, Decimal::ZERO)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn post_only(mut self) -> Self {
        self.post_only = Some(true);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = Some(true);
        self
    }
}

/// Params of `private/edit`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOrderRequest {
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBookRequest {
    pub instrument_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentsRequest {
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstrumentKind>,
    pub expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionsRequest {
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstrumentKind>,
}
