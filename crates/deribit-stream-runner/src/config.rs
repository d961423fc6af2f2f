/*
[INPUT]:  YAML configuration file, DERIBIT_CLIENT_ID / DERIBIT_CLIENT_SECRET
[OUTPUT]: Validated runner configuration and adapter client configs
[POS]:    Configuration layer - session setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, bail};
use deribit_stream_adapter::http::TESTNET_API_URL;
use deribit_stream_adapter::market_data::{book_channel, trades_channel};
use deribit_stream_adapter::ws::TESTNET_WS_URL;
use deribit_stream_adapter::{ClientConfig, ClientCredentials, WsConfig};
use serde::{Deserialize, Serialize};

pub const CLIENT_ID_ENV: &str = "DERIBIT_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "DERIBIT_CLIENT_SECRET";

/// Top-level configuration for the stream runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub venue: VenueConfig,
    /// API key used for `public/auth`; overridden by the environment
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    /// Channels to stream
    pub feeds: Vec<FeedConfig>,
    /// Deadline for WebSocket requests; unset waits forever
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// `public/set_heartbeat` interval (minimum 10)
    #[serde(default)]
    pub heartbeat_secs: Option<u64>,
    /// How often latency statistics are logged
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Fetch a REST order book for every book feed after subscribing
    #[serde(default = "default_true")]
    pub rest_snapshot: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_rest_timeout_ms")]
    pub rest_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            rest_url: default_rest_url(),
            rest_timeout_ms: default_rest_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// One feed: an instrument with book/trades flags, or a raw channel name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default = "default_true")]
    pub book: bool,
    #[serde(default)]
    pub trades: bool,
    #[serde(default)]
    pub channel: Option<String>,
}

/// A resolved channel and what it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChannel {
    Book { instrument: String, channel: String },
    Trades { instrument: String, channel: String },
    Raw { channel: String },
}

impl FeedChannel {
    pub fn channel(&self) -> &str {
        match self {
            FeedChannel::Book { channel, .. }
            | FeedChannel::Trades { channel, .. }
            | FeedChannel::Raw { channel } => channel,
        }
    }
}

fn default_ws_url() -> String {
    TESTNET_WS_URL.to_string()
}

fn default_rest_url() -> String {
    TESTNET_API_URL.to_string()
}

fn default_rest_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_stats_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl RunnerConfig {
    /// Load configuration from a YAML file and apply environment overrides
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config file {path}"))?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("parse config yaml")
    }

    /// Non-empty `DERIBIT_CLIENT_ID` / `DERIBIT_CLIENT_SECRET` replace file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(CLIENT_ID_ENV).filter(|value| !value.is_empty());
        let client_secret = lookup(CLIENT_SECRET_ENV).filter(|value| !value.is_empty());
        if client_id.is_none() && client_secret.is_none() {
            return;
        }

        let credentials = self.credentials.get_or_insert_with(CredentialsConfig::default);
        if let Some(client_id) = client_id {
            credentials.client_id = client_id;
        }
        if let Some(client_secret) = client_secret {
            credentials.client_secret = client_secret;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feeds.is_empty() {
            bail!("at least one feed is required");
        }
        for (index, feed) in self.feeds.iter().enumerate() {
            match (&feed.instrument, &feed.channel) {
                (None, None) => bail!("feed {index} needs an instrument or a channel"),
                (Some(_), Some(_)) => bail!("feed {index} sets both instrument and channel"),
                (Some(instrument), None) if !feed.book && !feed.trades => {
                    bail!("feed {index} ({instrument}) enables neither book nor trades")
                }
                _ => {}
            }
        }
        if self.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be positive");
        }
        self.ws_config().validate().context("invalid WebSocket settings")?;
        self.client_config().validate().context("invalid REST settings")?;
        Ok(())
    }

    /// Every channel the feeds resolve to, in file order, without duplicates
    pub fn channels(&self) -> Vec<FeedChannel> {
        let mut channels: Vec<FeedChannel> = Vec::new();
        let mut push = |channel: FeedChannel| {
            if !channels.iter().any(|c| c.channel() == channel.channel()) {
                channels.push(channel);
            }
        };

        for feed in &self.feeds {
            if let Some(channel) = &feed.channel {
                push(FeedChannel::Raw {
                    channel: channel.clone(),
                });
                continue;
            }
            let Some(instrument) = &feed.instrument else {
                continue;
            };
            if feed.book {
                push(FeedChannel::Book {
                    instrument: instrument.clone(),
                    channel: book_channel(instrument),
                });
            }
            if feed.trades {
                push(FeedChannel::Trades {
                    instrument: instrument.clone(),
                    channel: trades_channel(instrument),
                });
            }
        }
        channels
    }

    pub fn credentials(&self) -> Option<ClientCredentials> {
        self.credentials
            .as_ref()
            .map(|creds| ClientCredentials::new(&creds.client_id, &creds.client_secret))
            .filter(ClientCredentials::is_complete)
    }

    pub fn ws_config(&self) -> WsConfig {
        let mut config = WsConfig::new(&self.venue.ws_url);
        if let Some(credentials) = self.credentials() {
            config = config.with_credentials(credentials);
        }
        if let Some(timeout_ms) = self.request_timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat(Duration::from_secs(secs));
        }
        config
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.venue.rest_url.clone(),
            timeout: Duration::from_millis(self.venue.rest_timeout_ms),
            connect_timeout: Duration::from_millis(self.venue.connect_timeout_ms),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
