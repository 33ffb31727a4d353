// Hub authentication
//
// Client-credential token exchange against the hub's local OAuth endpoint.
// The `TokenManager` is the only owner of the bearer token: callers get a
// copy for a single request and hand it back via `invalidate_token` when
// the hub rejects it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;

/// Default port of the hub's HTTP control API.
pub const DEFAULT_HTTP_PORT: u16 = 1080;

/// Default port of the hub's MQTT event broker.
pub const DEFAULT_MQTT_PORT: u16 = 18080;

/// Token lifetime assumed when the hub omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(7200);

/// How long before the stated expiry a token is treated as expired.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/open/yolink/token";

// ── Credentials ─────────────────────────────────────────────────────

/// Everything needed to reach and authenticate with one hub.
#[derive(Debug, Clone)]
pub struct HubCredentials {
    /// Hub hostname or IP. A full URL is accepted; only the host is kept.
    pub host: String,
    pub http_port: u16,
    pub mqtt_port: u16,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Network id that scopes the MQTT event topic.
    pub net_id: String,
}

impl HubCredentials {
    /// Credentials with the hub's default ports.
    pub fn new(
        host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        net_id: impl Into<String>,
    ) -> Self {
        Self {
            host: normalize_host(&host.into()),
            http_port: DEFAULT_HTTP_PORT,
            mqtt_port: DEFAULT_MQTT_PORT,
            client_id: client_id.into(),
            client_secret,
            net_id: net_id.into(),
        }
    }

    /// Base URL of the HTTP control API, e.g. `http://192.168.1.20:1080`.
    pub fn http_base_url(&self) -> Result<Url, Error> {
        let host = normalize_host(&self.host);
        Url::parse(&format!("http://{host}:{}", self.http_port)).map_err(Error::InvalidUrl)
    }
}

/// Accept either a bare host or a URL and return just the hostname.
pub fn normalize_host(host_or_url: &str) -> String {
    let trimmed = host_or_url.trim();
    if trimmed.contains("://") {
        if let Some(host) = Url::parse(trimmed).ok().and_then(|u| u.host_str().map(String::from)) {
            return host;
        }
    }
    trimmed.trim_end_matches('/').to_owned()
}

// ── Token ───────────────────────────────────────────────────────────

/// A bearer token issued by the hub.
#[derive(Debug, Clone)]
pub struct Token {
    value: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: SecretString, issued_at: DateTime<Utc>, lifetime: Duration) -> Self {
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            issued_at,
            expires_at,
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token should no longer be used at `now`, treating it as
    /// expired `margin` before its stated expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        now.checked_add_signed(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }

    fn same_as(&self, other: &Token) -> bool {
        self.issued_at == other.issued_at
            && self.value.expose_secret() == other.value.expose_secret()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

// ── TokenManager ────────────────────────────────────────────────────

/// Obtains and caches the hub bearer token.
///
/// `get_token` hands out the cached token while it is valid and performs a
/// fresh exchange otherwise. Exchanges are serialized: concurrent callers
/// wait on the same lock instead of racing separate refreshes.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    expiry_margin: Duration,
    cached: Mutex<Option<Token>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, credentials: &HubCredentials) -> Result<Self, Error> {
        let token_url = credentials.http_base_url()?.join(TOKEN_PATH)?;
        Ok(Self::with_token_url(
            http,
            token_url,
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
        ))
    }

    /// Create a manager against an explicit token URL.
    pub fn with_token_url(
        http: reqwest::Client,
        token_url: Url,
        client_id: String,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            cached: Mutex::new(None),
        }
    }

    /// Override the clock-skew margin.
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Return a non-expired token, exchanging credentials if necessary.
    pub async fn get_token(&self) -> Result<Token, Error> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired_at(Utc::now(), self.expiry_margin) {
                return Ok(token.clone());
            }
            debug!(expires_at = %token.expires_at, "cached token expired");
        }

        let token = self.exchange().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next `get_token` performs an exchange.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
        debug!("token invalidated");
    }

    /// Drop the cached token only if it is the one the hub just rejected.
    ///
    /// Another caller may already have refreshed it; in that case the newer
    /// token is kept.
    pub async fn invalidate_token(&self, rejected: &Token) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.same_as(rejected)) {
            *cached = None;
            debug!("rejected token invalidated");
        }
    }

    /// Perform the client-credential exchange.
    async fn exchange(&self) -> Result<Token, Error> {
        debug!("requesting token at {}", self.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let issued_at = Utc::now();
        let resp = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::AuthUnavailable {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::AuthUnavailable {
            reason: e.to_string(),
        })?;

        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::Authentication {
                message: format!("token request rejected (HTTP {status}): {}", preview(&body)),
            });
        }

        if !status.is_success() {
            return Err(Error::AuthUnavailable {
                reason: format!("HTTP {status}: {}", preview(&body)),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::AuthUnavailable {
                reason: format!("unreadable token response: {e}"),
            })?;

        let Some(access_token) = parsed.access_token.filter(|t| !t.is_empty()) else {
            let detail = parsed
                .desc
                .or(parsed.msg)
                .unwrap_or_else(|| preview(&body).to_owned());
            warn!("token response carried no access_token");
            return Err(Error::Authentication { message: detail });
        };

        let lifetime = parsed
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);

        debug!(lifetime_secs = lifetime.as_secs(), "token issued");
        Ok(Token::new(
            SecretString::from(access_token),
            issued_at,
            lifetime,
        ))
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}
