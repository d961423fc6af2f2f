/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Deribit adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod error;
pub mod http;
pub mod latency;
pub mod market_data;
pub mod types;
pub mod ws;

pub use auth::{AuthResult, ClientCredentials, TokenData, TokenStore};

pub use error::{DeribitError, Result};

pub use http::{ClientConfig, DeribitClient};

pub use latency::{LatencyCategory, LatencyRecorder, LatencyStats};

pub use market_data::{BookSummary, MarketDataCache, MarketDataFeed, OrderBookSnapshot};

// Re-export all types
pub use types::*;

pub use ws::{
    ConnectionState,
    DeribitWebSocket,
    HandlerResult,
    RequestIntent,
    RequestOutcome,
    WsConfig,
};
