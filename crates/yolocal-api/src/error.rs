use thiserror::Error;

/// Top-level error type for the `yolocal-api` crate.
///
/// Covers every failure mode across both hub channels:
/// token exchange, the RPC control API, and the MQTT event broker.
/// `yolocal-core` maps these into operation-scoped diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the client credentials during token exchange.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The token endpoint could not be reached or answered garbage.
    #[error("Auth endpoint unavailable: {reason}")]
    AuthUnavailable { reason: String },

    /// The hub refused the bearer token on an API call (expired or revoked).
    #[error("Access token rejected by hub (code {})", .code.as_deref().unwrap_or("HTTP 401"))]
    TokenRejected { code: Option<String> },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Hub RPC ─────────────────────────────────────────────────────
    /// Non-success envelope code from the hub API.
    #[error("Hub API error ({code}): {message}")]
    Hub { code: String, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── MQTT ────────────────────────────────────────────────────────
    /// Broker connection failed or dropped.
    #[error("MQTT connection failed: {0}")]
    MqttConnect(String),

    /// Broker refused the event topic subscription.
    #[error("MQTT subscription rejected for {topic}")]
    MqttSubscribe { topic: String },

    /// Event payload could not be decoded into a device event.
    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },
}

impl Error {
    /// Returns `true` if the hub rejected the access token and a fresh
    /// token might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::TokenRejected { .. })
    }

    /// Returns `true` if the failure happened while obtaining a token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::AuthUnavailable { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::AuthUnavailable { .. } | Self::MqttConnect(_) => true,
            _ => false,
        }
    }

    /// Extract the hub envelope code, if available.
    pub fn hub_code(&self) -> Option<&str> {
        match self {
            Self::Hub { code, .. } => Some(code),
            Self::TokenRejected { code } => code.as_deref(),
            _ => None,
        }
    }
}
