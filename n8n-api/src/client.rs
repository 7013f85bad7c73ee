//! `N8nClient` and `ClientConfig`
//!
use std::time::Duration;

use crate::{
    Result,
    config::{DEFAULT_TIMEOUT_SECS, N8N_API_KEY_ENV, N8N_URL_ENV},
    http_client::HttpClient,
};

/// Configuration for [`N8nClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base url of the n8n server, without the api prefix.
    /// If not provided in config, the url is determined by:
    /// * the environment variable `N8N_URL`, if defined, or
    /// * `n8n_api::N8N_LOCAL_URL` "<http://127.0.0.1:5678>"
    pub base_url: String,

    /// Api key for the public REST api. Defaults to the environment
    /// variable `N8N_API_KEY`. Requests fail with an auth error if empty.
    pub api_key: String,

    /// Request timeout. Bulk listings of large workflow sets can be slow,
    /// so the default is generous.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var(N8N_URL_ENV).unwrap_or(crate::N8N_LOCAL_URL.to_string()),
            api_key: std::env::var(N8N_API_KEY_ENV).unwrap_or_default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Sets the base url.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Sets the api key.
    pub fn api_key(self, api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            ..self
        }
    }
}

/// Client for the n8n public REST api.
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct N8nClient {
    http: HttpClient,
}

impl N8nClient {
    /// Creates a client with default configuration from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with the given configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let base_url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            crate::N8N_API_BASE_PATH
        );
        let builder = reqwest::Client::builder().timeout(config.timeout);
        Ok(N8nClient {
            http: HttpClient::new(builder, base_url, config.api_key)?,
        })
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }
}
