// ── Core error types ──
//
// User-facing errors from doorlink-core, plus the narrower error types the
// snapshot and command boundaries report. The `From<doorlink_api::Error>`
// impls translate transport-layer errors into these.

use thiserror::Error;

use crate::model::DoorId;

// ── Boundary errors ─────────────────────────────────────────────────

/// Failure of a [`SnapshotProvider`](crate::provider::SnapshotProvider).
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// The credential was rejected; refresh it and retry.
    #[error("snapshot request unauthorized")]
    Unauthorized,

    /// Network or server trouble; a later attempt may succeed.
    #[error("snapshot temporarily unavailable: {0}")]
    Transient(String),

    /// The response could not be decoded or lacked required fields.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

impl From<doorlink_api::Error> for SnapshotError {
    fn from(err: doorlink_api::Error) -> Self {
        match err {
            e if e.is_auth_expired() => Self::Unauthorized,
            doorlink_api::Error::Deserialization { message, .. } => Self::Malformed(message),
            e => Self::Transient(e.to_string()),
        }
    }
}

/// Failure of a [`CommandChannel`](crate::provider::CommandChannel).
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The door is already in the requested position.
    #[error("door is already in the requested state")]
    AlreadyInState,

    #[error("command unauthorized")]
    Unauthorized,

    #[error("command temporarily failed: {0}")]
    Transient(String),

    #[error("command rejected: {0}")]
    Fatal(String),
}

impl From<doorlink_api::Error> for CommandError {
    fn from(err: doorlink_api::Error) -> Self {
        match err {
            e if e.is_already_in_state() => Self::AlreadyInState,
            e if e.is_auth_expired() => Self::Unauthorized,
            e if e.is_transient() => Self::Transient(e.to_string()),
            e => Self::Fatal(e.to_string()),
        }
    }
}

// ── CoreError ───────────────────────────────────────────────────────

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach door service: {reason}")]
    ConnectionFailed { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Door not found: {id}")]
    DoorNotFound { id: DoorId },

    #[error("Snapshot rejected: {0}")]
    Snapshot(SnapshotError),

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Door command failed: {0}")]
    Command(CommandError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },
}

impl From<SnapshotError> for CoreError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Unauthorized => Self::AuthenticationFailed {
                message: "access token rejected while fetching doors".into(),
            },
            SnapshotError::Transient(reason) => Self::ConnectionFailed { reason },
            e @ SnapshotError::Malformed(_) => Self::Snapshot(e),
        }
    }
}

impl From<CommandError> for CoreError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Unauthorized => Self::AuthenticationFailed {
                message: "access token rejected while sending command".into(),
            },
            CommandError::Transient(reason) => Self::ConnectionFailed { reason },
            e => Self::Command(e),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<doorlink_api::Error> for CoreError {
    fn from(err: doorlink_api::Error) -> Self {
        match err {
            doorlink_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            doorlink_api::Error::Unauthorized { status } => CoreError::AuthenticationFailed {
                message: format!("access token rejected (HTTP {status})"),
            },
            doorlink_api::Error::MissingToken => CoreError::AuthenticationFailed {
                message: "not logged in".into(),
            },
            doorlink_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            doorlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            doorlink_api::Error::InvalidHeader(e) => CoreError::Config {
                message: format!("invalid header value: {e}"),
            },
            doorlink_api::Error::Api { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            doorlink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            doorlink_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("push channel closed (code {code}): {reason}"),
            },
            doorlink_api::Error::Deserialization { message, .. } => {
                CoreError::Snapshot(SnapshotError::Malformed(message))
            }
        }
    }
}
