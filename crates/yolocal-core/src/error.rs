// ── Core error types ──
//
// User-facing errors from yolocal-core, scoped to the operation that
// failed. Consumers never see raw envelope codes or JSON parse failures;
// the constructors below fold transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// No valid token could be obtained. Everything depending on the hub
    /// is unavailable until this clears.
    #[error("Hub authentication unavailable: {message}")]
    AuthUnavailable { message: String },

    #[error("Device discovery failed: {source}")]
    DiscoveryFailed {
        #[source]
        source: yolocal_api::Error,
    },

    #[error("Coordinator is not connected")]
    Disconnected,

    // ── Device errors ────────────────────────────────────────────────
    #[error("State fetch failed for {device_id}: {source}")]
    FetchFailed {
        device_id: String,
        #[source]
        source: yolocal_api::Error,
    },

    #[error("Command failed for {device_id}: {source}")]
    CommandFailed {
        device_id: String,
        #[source]
        source: yolocal_api::Error,
    },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Operation not supported: {operation} on {device_type}")]
    Unsupported {
        operation: String,
        device_type: String,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a discovery error, surfacing auth failures as such.
    pub fn discovery(err: yolocal_api::Error) -> Self {
        Self::auth_or(err, |source| Self::DiscoveryFailed { source })
    }

    pub fn fetch(device_id: &str, err: yolocal_api::Error) -> Self {
        Self::auth_or(err, |source| Self::FetchFailed {
            device_id: device_id.to_owned(),
            source,
        })
    }

    pub fn command(device_id: &str, err: yolocal_api::Error) -> Self {
        Self::auth_or(err, |source| Self::CommandFailed {
            device_id: device_id.to_owned(),
            source,
        })
    }

    /// Returns `true` if this error means the hub refused to authenticate.
    pub fn is_auth_unavailable(&self) -> bool {
        matches!(self, Self::AuthUnavailable { .. })
    }

    fn auth_or(
        err: yolocal_api::Error,
        wrap: impl FnOnce(yolocal_api::Error) -> Self,
    ) -> Self {
        if err.is_auth_failure() {
            Self::AuthUnavailable {
                message: err.to_string(),
            }
        } else {
            wrap(err)
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<yolocal_api::Error> for CoreError {
    fn from(err: yolocal_api::Error) -> Self {
        match err {
            yolocal_api::Error::Authentication { message }
            | yolocal_api::Error::AuthUnavailable { reason: message } => {
                CoreError::AuthUnavailable { message }
            }
            yolocal_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid hub URL: {e}"),
            },
            other => CoreError::Internal(other.to_string()),
        }
    }
}
