/*
[INPUT]:  WebSocket configuration, credentials and subscription channels
[OUTPUT]: Authenticated JSON-RPC session with channel dispatch
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod message;
pub mod state;

pub use client::{ConnectivityCallback, DeribitWebSocket, RequestObserver};
pub use config::{MAINNET_WS_URL, TESTNET_WS_URL, WsConfig};
pub use correlator::{Correlator, PendingRequest, RequestIntent, RequestOutcome};
pub use dispatch::{ChannelHandler, DispatchTable, Dispatched, HandlerError, HandlerResult};
pub use message::{BookLevel, BookUpdate, Envelope, Inbound, RequestId, RpcError, TradeData};
pub use state::ConnectionState;
