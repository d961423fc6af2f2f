/*
[INPUT]:  `public/auth` results (access token, expiry, refresh token)
[OUTPUT]: Current bearer token shared between WebSocket and REST clients
[POS]:    Auth layer - token lifecycle management
[UPDATE]: When adding token refresh or changing storage strategy
*/

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

/// `result` of a successful `public/auth` reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthResult {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Stored token data with metadata
#[derive(Debug, Clone)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Thread-safe access token holder.
///
/// Cloning shares the underlying slot, so a token negotiated on the stream is
/// visible to every REST client built from the same store.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    data: Arc<RwLock<Option<TokenData>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, result: AuthResult) {
        let token_data = TokenData {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            scope: result.scope,
            expires_at: Utc::now() + Duration::seconds(result.expires_in),
        };
        *self.data.write() = Some(token_data);
    }

    pub fn access_token(&self) -> Option<String> {
        self.data.read().as_ref().map(|data| data.access_token.clone())
    }

    /// Value of the `Authorization` header, if a token is known
    pub fn bearer(&self) -> Option<String> {
        self.access_token().map(|token| format!("Bearer {token}"))
    }

    pub fn is_expired(&self) -> bool {
        match self.data.read().as_ref() {
            Some(data) => Utc::now() > data.expires_at,
            None => true,
        }
    }

    pub fn token_data(&self) -> Option<TokenData> {
        self.data.read().clone()
    }

    pub fn clear(&self) {
        *self.data.write() = None;
    }
}
