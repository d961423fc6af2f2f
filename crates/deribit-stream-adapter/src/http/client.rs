/*
[INPUT]:  HTTP configuration (base URL, timeouts), shared token store
[OUTPUT]: JSON-RPC over HTTPS calls with typed results and latency samples
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{AuthResult, ClientCredentials, TokenStore};
use crate::error::{DeribitError, Result};
use crate::latency::{LatencyCategory, LatencyRecorder};
use crate::ws::message::{RequestId, RpcError, RpcRequest};

pub const TESTNET_API_URL: &str = "https://test.deribit.com/api/v2";
pub const MAINNET_API_URL: &str = "https://www.deribit.com/api/v2";

const ERROR_BODY_MAX_BYTES: usize = 512;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: TESTNET_API_URL.to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeribitError::Config(format!(
                "REST URL must use http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

/// JSON-RPC client for the Deribit HTTP API.
///
/// Cloning is cheap; clones share the connection pool, token store, latency
/// recorder and id counter. Concurrent calls are allowed.
#[derive(Debug, Clone)]
pub struct DeribitClient {
    http_client: Client,
    base_url: Url,
    timeout: Duration,
    tokens: TokenStore,
    latency: Arc<LatencyRecorder>,
    next_id: Arc<AtomicU64>,
}

impl DeribitClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_shared(config, TokenStore::new(), Arc::new(LatencyRecorder::new()))
    }

    /// Create a client that reads its bearer token from `tokens` and records
    /// into `latency`, typically the ones owned by a `DeribitWebSocket`.
    pub fn with_shared(
        config: ClientConfig,
        tokens: TokenStore,
        latency: Arc<LatencyRecorder>,
    ) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(&config.base_url)?,
            timeout: config.timeout,
            tokens,
            latency,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token_store(&self) -> TokenStore {
        self.tokens.clone()
    }

    pub fn latency(&self) -> Arc<LatencyRecorder> {
        self.latency.clone()
    }

    /// Issue one JSON-RPC call.
    ///
    /// Private calls carry `Authorization: Bearer <token>` when a token is known.
    pub async fn call<P, R>(&self, method: &str, params: P, private: bool) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id: RequestId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut builder = self
            .http_client
            .post(self.base_url.clone())
            .json(&RpcRequest::new(id, method, params));

        if private {
            match self.tokens.bearer() {
                Some(bearer) => {
                    if self.tokens.is_expired() {
                        warn!(method, "access token expired; the venue may reject this call");
                    }
                    builder = builder.header(AUTHORIZATION, bearer);
                }
                None => warn!(method, "private call without access token"),
            }
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                DeribitError::Timeout {
                    duration_ms: self.timeout.as_millis() as u64,
                }
            } else {
                err.into()
            }
        })?;
        let status = response.status();
        let body = response.bytes().await?;
        let elapsed = started.elapsed();
        self.latency.record_since(LatencyCategory::Rest, started);

        debug!(
            method,
            id,
            status = status.as_u16(),
            latency_us = elapsed.as_micros() as u64,
            "REST call completed"
        );

        let reply: RpcReply<R> = match serde_json::from_slice(&body) {
            Ok(reply) => reply,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(DeribitError::api_error(
                    i64::from(status.as_u16()),
                    truncate_body(&body),
                ));
            }
        };

        if let Some(error) = reply.error {
            warn!(method, code = error.code, message = %error.message, "REST call rejected");
            return Err(DeribitError::api_error(error.code, error.message));
        }

        reply.result.ok_or_else(|| {
            DeribitError::Protocol(format!("{method} reply carries neither result nor error"))
        })
    }

    /// `public/auth` with client credentials. Stores the token on success.
    pub async fn authenticate(&self, credentials: &ClientCredentials) -> Result<AuthResult> {
        if !credentials.is_complete() {
            return Err(DeribitError::Authentication {
                message: "client id and secret are required".to_string(),
            });
        }

        let result: AuthResult = self
            .call("public/auth", credentials.auth_params(), false)
            .await
            .map_err(|err| match err {
                DeribitError::Api { code, message } => DeribitError::Authentication {
                    message: format!("{message} (code {code})"),
                },
                other => other,
            })?;

        info!(expires_in = result.expires_in, "REST client authenticated");
        self.tokens.store(result.clone());
        Ok(result)
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= ERROR_BODY_MAX_BYTES {
        return text.into_owned();
    }
    let mut end = ERROR_BODY_MAX_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DeribitClient {
        let config = ClientConfig::default().with_base_url(format!("{}/api/v2", server.uri()));
        DeribitClient::with_config(config).expect("client init")
    }

    #[test]
    fn test_default_timeouts() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.base_url, TESTNET_API_URL);
    }

    #[tokio::test]
    async fn test_call_posts_jsonrpc_and_records_latency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "public/test",
                "params": {}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"version": "1.2.26"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result: Value = client.call("public/test", json!({}), false).await.unwrap();

        assert_eq!(result["version"], "1.2.26");
        assert_eq!(client.latency().count(LatencyCategory::Rest), 1);
    }

    #[tokio::test]
    async fn test_slow_venue_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "ok"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = ClientConfig {
            timeout: Duration::from_millis(100),
            ..ClientConfig::default().with_base_url(server.uri())
        };
        let client = DeribitClient::with_config(config).unwrap();
        let err = client
            .call::<_, Value>("public/test", json!({}), false)
            .await
            .unwrap_err();

        assert!(matches!(err, DeribitError::Timeout { duration_ms: 100 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": 10009, "message": "not_enough_funds"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .call::<_, Value>("private/buy", json!({}), true)
            .await
            .unwrap_err();

        assert!(matches!(err, DeribitError::Api { code: 10009, .. }));
    }

    #[tokio::test]
    async fn test_non_json_failure_uses_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .call::<_, Value>("public/test", json!({}), false)
            .await
            .unwrap_err();

        match err {
            DeribitError::Api { code, message } => {
                assert_eq!(code, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authenticate_stores_bearer_for_private_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "public/auth",
                "params": {
                    "grant_type": "client_credentials",
                    "client_id": "id",
                    "client_secret": "secret"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"access_token": "T", "expires_in": 900, "token_type": "bearer"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer T"))
            .and(body_partial_json(json!({"method": "private/get_positions"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let auth = client
            .authenticate(&ClientCredentials::new("id", "secret"))
            .await
            .unwrap();
        assert_eq!(auth.access_token, "T");

        let positions: Vec<Value> = client
            .call("private/get_positions", json!({"currency": "BTC"}), true)
            .await
            .unwrap();
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn test_authenticate_requires_complete_credentials() {
        let client = DeribitClient::new().unwrap();
        let err = client
            .authenticate(&ClientCredentials::new("", ""))
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
    }
}
