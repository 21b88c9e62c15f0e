use thiserror::Error;

/// Top-level error type for the `doorlink-api` crate.
///
/// Covers every failure mode of the cloud surfaces: token acquisition,
/// HTTP transport, the device REST API, and the push WebSocket.
/// `doorlink-core` maps these into snapshot/command boundary errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or token refresh was rejected (bad credentials, revoked refresh token).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The bearer token was rejected by the service (HTTP 401/403).
    #[error("Access token rejected (HTTP {status}) -- re-authentication required")]
    Unauthorized { status: u16 },

    /// A request needed a bearer token but none has been set yet.
    #[error("No access token available -- log in first")]
    MissingToken,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A configured header value is not valid HTTP.
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    // ── Device API ──────────────────────────────────────────────────
    /// Non-success response from the device API, with the raw body.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the token has expired or was never set,
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::MissingToken)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if the service refused a door command because the
    /// door is already in the requested state.
    ///
    /// The service answers `400 {"code":400,"error":"Door is already open"}`.
    pub fn is_already_in_state(&self) -> bool {
        match self {
            Self::Api { status: 400, body } => body.contains("Door is already"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_in_state_matches_service_body() {
        let err = Error::Api {
            status: 400,
            body: r#"{"code":400,"error":"Door is already closed"}"#.into(),
        };
        assert!(err.is_already_in_state());
        assert!(!err.is_transient());
    }

    #[test]
    fn other_bad_requests_are_not_already_in_state() {
        let err = Error::Api {
            status: 400,
            body: r#"{"code":400,"error":"Invalid command"}"#.into(),
        };
        assert!(!err.is_already_in_state());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Api {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_auth_expired());
    }

    #[test]
    fn unauthorized_is_auth_expired() {
        assert!(Error::Unauthorized { status: 401 }.is_auth_expired());
        assert!(Error::MissingToken.is_auth_expired());
    }
}
