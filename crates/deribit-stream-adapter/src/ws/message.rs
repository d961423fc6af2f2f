/*
[INPUT]:  Raw JSON-RPC 2.0 text frames
[OUTPUT]: Decoded envelopes classified as reply / push / heartbeat
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new message types or changing format
*/

use std::fmt;

use rust_decimal::Decimal;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Direction;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier allocated by the correlator
pub type RequestId = u64;

/// Outbound JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<P> {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: P,
}

impl<P: Serialize> RpcRequest<P> {
    pub fn new(id: RequestId, method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Any inbound JSON-RPC message, immutable once decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Server-side processing time reported by the venue, microseconds
    #[serde(default, rename = "usDiff")]
    pub us_diff: Option<u64>,
}

/// Classification of a decoded envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to one of our requests
    Reply {
        id: RequestId,
        outcome: Result<Value, RpcError>,
    },
    /// `method: "subscription"` notification
    Push { channel: String, data: Value },
    /// `method: "heartbeat"` notification; `test_request` expects a `public/test` call
    Heartbeat { test_request: bool },
    Unrecognized,
}

impl Envelope {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn classify(self) -> Inbound {
        if let Some(id) = self.id {
            if let Some(error) = self.error {
                return Inbound::Reply {
                    id,
                    outcome: Err(error),
                };
            }
            if let Some(result) = self.result {
                return Inbound::Reply {
                    id,
                    outcome: Ok(result),
                };
            }
        }

        match (self.method.as_deref(), self.params) {
            (Some("subscription"), Some(mut params)) => {
                let channel = params
                    .get("channel")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                match channel {
                    Some(channel) => Inbound::Push {
                        channel,
                        data: params.get_mut("data").map(Value::take).unwrap_or(Value::Null),
                    },
                    None => Inbound::Unrecognized,
                }
            }
            (Some("heartbeat"), params) => Inbound::Heartbeat {
                test_request: params
                    .as_ref()
                    .and_then(|p| p.get("type"))
                    .and_then(Value::as_str)
                    == Some("test_request"),
            },
            _ => Inbound::Unrecognized,
        }
    }
}

/// Method used to (un)subscribe a channel. `user.*` channels need a token.
pub fn subscription_method(channel: &str, subscribe: bool) -> &'static str {
    match (channel.starts_with("user."), subscribe) {
        (true, true) => "private/subscribe",
        (true, false) => "private/unsubscribe",
        (false, true) => "public/subscribe",
        (false, false) => "public/unsubscribe",
    }
}

/// One side of a book level.
///
/// Accepts both `[price, amount]` and `[action, price, amount]` entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookLevel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub price: Decimal,
    pub amount: Decimal,
}

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl<'de> Visitor<'de> for LevelVisitor {
            type Value = BookLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[price, amount] or [action, price, amount]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BookLevel, A::Error> {
                let first: Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let (action, price) = match first {
                    Value::String(action) => {
                        let price: Decimal = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        (Some(action), price)
                    }
                    other => (
                        None,
                        <Decimal as Deserialize>::deserialize(other).map_err(de::Error::custom)?,
                    ),
                };
                let amount: Decimal = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                Ok(BookLevel {
                    action,
                    price,
                    amount,
                })
            }
        }

        deserializer.deserialize_seq(LevelVisitor)
    }
}

/// Payload of `book.<instrument>.<interval>` pushes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BookUpdate {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub instrument_name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub change_id: Option<i64>,
    #[serde(default)]
    pub prev_change_id: Option<i64>,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

/// One element of a `trades.<instrument>.<interval>` push
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeData {
    pub trade_id: String,
    pub instrument_name: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub direction: Direction,
    pub timestamp: i64,
    #[serde(default)]
    pub trade_seq: Option<i64>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub index_price: Option<Decimal>,
}
