// Shared transport configuration for building reqwest::Client instances.
//
// The device API and the token endpoint share timeout and header
// settings through this module.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

/// Version string the service expects in the `app_version` header.
pub const DEFAULT_APP_VERSION: &str = "6.21";

/// User agent sent on every HTTP request.
pub const DEFAULT_USER_AGENT: &str = "okhttp/4.10.0";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub app_version: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.into(),
            app_version: DEFAULT_APP_VERSION.into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut headers = HeaderMap::new();
        headers.insert("app_version", HeaderValue::from_str(&self.app_version)?);

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
