//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use doorlink_config::ConfigError;
use doorlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the door service")]
    #[diagnostic(
        code(doorlink::connection_failed),
        help(
            "Check network access and the profile's api_url.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(doorlink::auth_failed),
        help(
            "Verify the account credentials.\n\
             Run: doorlink config set-password (or set-token) --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(doorlink::no_credentials),
        help(
            "Configure credentials with: doorlink config init\n\
             Or set DOORLINK_TOKEN / DOORLINK_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Doors ────────────────────────────────────────────────────────

    #[error("Door '{identifier}' not found")]
    #[diagnostic(
        code(doorlink::not_found),
        help("Run: doorlink doors to see available doors")
    )]
    NotFound { identifier: String },

    #[error("Door name '{identifier}' is ambiguous")]
    #[diagnostic(
        code(doorlink::ambiguous),
        help("Matching doors: {matches}\nUse the door id instead.")
    )]
    Ambiguous { identifier: String, matches: String },

    #[error("Door command rejected: {message}")]
    #[diagnostic(code(doorlink::command_rejected))]
    CommandRejected { message: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(doorlink::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(doorlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(doorlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: doorlink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(doorlink::no_config),
        help(
            "Create one with: doorlink config init\n\
             Or pass --api-url, --push-url and --token.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(doorlink::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Door did not reach '{expected}' within {seconds}s")]
    #[diagnostic(
        code(doorlink::timeout),
        help("Increase --wait-timeout or check the door with: doorlink status <door>")
    )]
    Timeout { expected: String, seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {message}")]
    #[diagnostic(code(doorlink::render))]
    Render { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Ambiguous { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::DoorNotFound { id } => CliError::NotFound {
                identifier: id.to_string(),
            },
            CoreError::Snapshot(e) => CliError::ApiError {
                status: None,
                message: e.to_string(),
            },
            CoreError::Command(e) => CliError::CommandRejected {
                message: e.to_string(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Api { message, status } => CliError::ApiError { status, message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
