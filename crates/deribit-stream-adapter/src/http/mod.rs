/*
[INPUT]:  HTTP client configuration and JSON-RPC methods
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new methods or changing client behavior
*/

pub mod account;
pub mod client;
pub mod public;
pub mod trade;

pub use client::{ClientConfig, DeribitClient, MAINNET_API_URL, TESTNET_API_URL};
