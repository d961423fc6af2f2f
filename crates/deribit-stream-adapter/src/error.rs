/*
[INPUT]:  Error sources (HTTP, JSON-RPC, serialization, transport, connection state)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

use crate::ws::ConnectionState;

/// Main error type for the Deribit adapter
#[derive(Error, Debug)]
pub enum DeribitError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Venue returned a JSON-RPC error object
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Socket, TLS or WebSocket handshake failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Message did not have the expected JSON-RPC shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation requires a ready connection
    #[error("Connection not ready (state: {state})")]
    NotReady { state: ConnectionState },

    /// The connection dropped while the request was outstanding
    #[error("Connection lost")]
    ConnectionLost,

    /// Request exceeded its deadline
    #[error("Request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeribitError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeribitError::Http(_)
                | DeribitError::Transport(_)
                | DeribitError::ConnectionLost
                | DeribitError::Timeout { .. }
        )
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        match self {
            DeribitError::Authentication { .. } => true,
            // 13004: invalid_credentials, 13009: unauthorized
            DeribitError::Api { code, .. } => matches!(code, 13004 | 13009),
            _ => false,
        }
    }

    /// Create an API error from a JSON-RPC error object
    pub fn api_error(code: i64, message: impl Into<String>) -> Self {
        DeribitError::Api {
            code,
            message: message.into(),
        }
    }
}

/// Result type alias for Deribit operations
pub type Result<T> = std::result::Result<T, DeribitError>;
