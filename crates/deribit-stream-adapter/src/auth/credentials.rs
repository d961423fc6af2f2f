/*
[INPUT]:  Client id / client secret issued by the venue
[OUTPUT]: `public/auth` request parameters
[POS]:    Auth layer - client credentials grant
[UPDATE]: When adding grant types or credential sources
*/

use std::fmt;

use serde::Serialize;

/// API key pair used for the `client_credentials` grant
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Both halves present
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn auth_params(&self) -> AuthParams<'_> {
        AuthParams {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Params of `public/auth`
#[derive(Debug, Serialize)]
pub struct AuthParams<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}
