/*
[INPUT]:  Endpoint URL, credentials and optional protocol timings
[OUTPUT]: Validated WebSocket client configuration
[POS]:    WebSocket layer - connection configuration
[UPDATE]: When adding connection options
*/

use std::time::Duration;

use url::Url;

use crate::auth::ClientCredentials;
use crate::error::{DeribitError, Result};

pub const TESTNET_WS_URL: &str = "wss://test.deribit.com/ws/api/v2";
pub const MAINNET_WS_URL: &str = "wss://www.deribit.com/ws/api/v2";

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Sent with `public/auth` right after the handshake; `None` skips auth.
    pub credentials: Option<ClientCredentials>,
    /// Pending requests older than this resolve as timed out. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Interval handed to `public/set_heartbeat` once ready (venue minimum is 10s).
    pub heartbeat_interval: Option<Duration>,
    /// How long a graceful close waits for the venue's close frame.
    pub close_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: TESTNET_WS_URL.to_string(),
            credentials: None,
            request_timeout: None,
            heartbeat_interval: None,
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Credentials that will actually be used (both id and secret present)
    pub fn auth_credentials(&self) -> Option<&ClientCredentials> {
        self.credentials.as_ref().filter(|creds| creds.is_complete())
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(DeribitError::Config(format!(
                "WebSocket URL must use ws or wss, got {}",
                url.scheme()
            )));
        }
        if let Some(interval) = self.heartbeat_interval
            && interval < Duration::from_secs(10)
        {
            return Err(DeribitError::Config(
                "heartbeat interval must be at least 10s".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_testnet() {
        let config = WsConfig::default();
        assert_eq!(config.url, TESTNET_WS_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_http_scheme() {
        let err = WsConfig::new("https://test.deribit.com/api/v2")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeribitError::Config(_)));
    }

    #[test]
    fn test_rejects_short_heartbeat() {
        let config = WsConfig::default().with_heartbeat(Duration::from_secs(5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_incomplete_credentials_skip_auth() {
        let config = WsConfig::default().with_credentials(ClientCredentials::new("id", ""));
        assert!(config.auth_credentials().is_none());
    }
}
