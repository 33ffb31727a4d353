//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use yolocal_config::ConfigError;
use yolocal_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the hub: {message}")]
    #[diagnostic(
        code(yolocal::connection_failed),
        help("Check that the hub is powered on and that host and http_port in your profile are correct.")
    )]
    ConnectionFailed { message: String },

    #[error("Hub authentication failed: {message}")]
    #[diagnostic(
        code(yolocal::auth_failed),
        help("Verify client_id and the client secret for profile '{profile}'.")
    )]
    AuthFailed { profile: String, message: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(yolocal::not_found),
        help("Run: yolocal devices --all to see available devices")
    )]
    NotFound { identifier: String },

    #[error("'{operation}' is not supported by {device_type} devices")]
    #[diagnostic(code(yolocal::unsupported))]
    Unsupported {
        operation: String,
        device_type: String,
    },

    #[error("Hub request failed: {message}")]
    #[diagnostic(code(yolocal::hub_error))]
    Hub { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(yolocal::config),
        help("Run: yolocal config path to locate the config file")
    )]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("No change observed within {seconds}s")]
    #[diagnostic(code(yolocal::timeout))]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            _ => exit_code::GENERAL,
        }
    }

    /// Convert a core error, naming the profile in auth failures.
    pub fn from_core(err: CoreError, profile: &str) -> Self {
        match err {
            CoreError::AuthUnavailable { message } => Self::AuthFailed {
                profile: profile.to_owned(),
                message,
            },
            CoreError::DiscoveryFailed { source } if source.is_transient() => {
                Self::ConnectionFailed {
                    message: source.to_string(),
                }
            }
            CoreError::Disconnected => Self::ConnectionFailed {
                message: "not connected".into(),
            },
            CoreError::DeviceNotFound { identifier } => Self::NotFound { identifier },
            CoreError::Unsupported {
                operation,
                device_type,
            } => Self::Unsupported {
                operation,
                device_type,
            },
            CoreError::Config { message } | CoreError::Internal(message) => {
                Self::Internal(message)
            }
            other => Self::Hub {
                message: other.to_string(),
            },
        }
    }
}
