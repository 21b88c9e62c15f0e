// ── Runtime controller configuration ──
//
// These types describe *how* to reach the door service. They carry
// credential data and tuning, but never touch disk. The CLI builds a
// `ControllerConfig` (usually from a config profile) and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use doorlink_api::ReconnectConfig;

use crate::model::DEFAULT_SERIAL_PREFIX_LEN;

/// How to obtain a bearer token.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Pre-issued bearer token. Cannot be refreshed.
    Token(SecretString),
    /// Password grant against the service's token endpoint.
    Password {
        username: String,
        password: SecretString,
    },
}

/// Configuration for one door service account.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// REST API root (e.g. `https://api.example.net/v1`).
    pub api_url: Url,
    /// Push notification endpoint (e.g. `wss://events.example.net/updates`).
    pub push_url: Url,
    pub auth: AuthCredentials,
    /// OAuth client id sent with token requests.
    pub client_id: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Full snapshot interval (seconds). 0 = only on demand.
    pub refresh_interval_secs: u64,
    /// Open the push channel on `start()`.
    pub push_enabled: bool,
    /// Push reconnect and heartbeat tuning.
    pub reconnect: ReconnectConfig,
    /// Leading serial characters that identify a device.
    pub serial_prefix_len: usize,
}

impl ControllerConfig {
    /// Build a config with default tuning.
    pub fn new(api_url: Url, push_url: Url, auth: AuthCredentials) -> Self {
        Self {
            api_url,
            push_url,
            auth,
            client_id: "doorlink".into(),
            timeout: Duration::from_secs(30),
            refresh_interval_secs: 300,
            push_enabled: true,
            reconnect: ReconnectConfig::default(),
            serial_prefix_len: DEFAULT_SERIAL_PREFIX_LEN,
        }
    }

    /// Snapshot interval, or `None` when periodic refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_disables_refresh() {
        let mut config = ControllerConfig::new(
            Url::parse("https://api.example.net/v1").unwrap(),
            Url::parse("wss://events.example.net/updates").unwrap(),
            AuthCredentials::Token(SecretString::from("t".to_string())),
        );
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));

        config.refresh_interval_secs = 0;
        assert_eq!(config.refresh_interval(), None);
    }
}
