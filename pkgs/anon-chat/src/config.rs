use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::error::ChatError;

/// Environment variable overriding the relay endpoint
pub const ENDPOINT_ENV: &str = "ANON_WEBSOCKET_URL";

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8081/ws";

pub const DEFAULT_TOKEN_PARAM: &str = "token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay websocket endpoint, without the auth token
    pub endpoint: Url,

    /// Directory for per-user contacts and unread counts
    pub storage_dir: PathBuf,

    /// Query parameter carrying the auth token at connect time
    pub token_param: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let endpoint = std::env::var(ENDPOINT_ENV)
            .ok()
            .and_then(|raw| Url::parse(&raw).ok())
            .unwrap_or_else(default_endpoint);

        let mut storage_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        storage_dir.push(".anon");

        Self {
            endpoint,
            storage_dir,
            token_param: DEFAULT_TOKEN_PARAM.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientConfigUpdates {
    pub endpoint: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub token_param: Option<String>,
}

impl ClientConfig {
    pub fn apply(&mut self, updates: ClientConfigUpdates) -> Result<(), ChatError> {
        if let Some(endpoint) = updates.endpoint {
            self.endpoint = parse_endpoint(&endpoint)?;
        }
        if let Some(storage_dir) = updates.storage_dir {
            self.storage_dir = storage_dir;
        }
        if let Some(token_param) = updates.token_param {
            if token_param.is_empty() {
                return Err(ChatError::InvalidEndpoint(
                    "token parameter name is empty".to_string(),
                ));
            }
            self.token_param = token_param;
        }
        Ok(())
    }
}

/// Parse a relay endpoint; only `ws` and `wss` are accepted
pub fn parse_endpoint(raw: &str) -> Result<Url, ChatError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ChatError::InvalidEndpoint(format!(
            "unsupported scheme {:?}",
            other
        ))),
    }
}

/// Connect address: `endpoint` with the auth token appended as a query parameter
pub fn with_token(endpoint: &Url, param: &str, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair(param, token);
    url
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL")
}
