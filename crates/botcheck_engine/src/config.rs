use std::path::PathBuf;
use std::time::Duration;

use botcheck_core::StreamOptions;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Where and how to reach the job server.
///
/// Passed explicitly to [`crate::ApiClient`] and [`crate::WsConnector`]; there is
/// no process-wide client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base: String,
    pub socket_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_SERVER_URL.to_string(),
            socket_url: DEFAULT_SERVER_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Reads `BOTCHECK_API_BASE`, `BOTCHECK_SOCKET_URL` and `BOTCHECK_API_KEY`,
    /// falling back to the defaults for anything unset or blank.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();
        Self {
            api_base: read("BOTCHECK_API_BASE").unwrap_or(defaults.api_base),
            socket_url: read("BOTCHECK_SOCKET_URL").unwrap_or(defaults.socket_url),
            api_key: read("BOTCHECK_API_KEY"),
            ..defaults
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }
}

/// Per-stream runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub options: StreamOptions,
    /// Directory backing the local event store.
    pub store_dir: PathBuf,
}

impl StreamSettings {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            options: StreamOptions::default(),
            store_dir: store_dir.into(),
        }
    }
}
