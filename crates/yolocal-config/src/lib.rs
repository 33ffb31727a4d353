//! Configuration for the yolocal CLI.
//!
//! TOML profiles layered with environment overrides, secret resolution,
//! and translation to `yolocal_core::CoordinatorConfig`. When no profile
//! is configured, the `YOLINK_*` environment variables used by the hub's
//! own tooling describe an ad-hoc one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use yolocal_core::{CoordinatorConfig, HubCredentials};

/// Name given to the profile built from `YOLINK_*` variables.
pub const ENV_PROFILE: &str = "env";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no client secret configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no hub configured: add a profile to {path} or set YOLINK_HOST, YOLINK_CLIENT_ID, YOLINK_CLIENT_SECRET and YOLINK_NET_ID")]
    NoProfile { path: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Render as TOML with every plaintext secret masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut redacted = self.clone();
        for profile in redacted.profiles.values_mut() {
            if profile.client_secret.is_some() {
                profile.client_secret = Some("********".into());
            }
        }
        Ok(toml::to_string_pretty(&redacted)?)
    }
}

/// Values applied to every profile that does not override them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// HTTP request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Refresh cycle interval (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Seconds without news before a device is considered stale.
    #[serde(default = "default_freshness_window")]
    pub freshness_window: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            refresh_interval: default_refresh_interval(),
            freshness_window: default_freshness_window(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_refresh_interval() -> u64 {
    300
}
fn default_freshness_window() -> u64 {
    3600
}

/// A named hub profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Hub hostname, IP, or URL.
    pub host: String,

    pub http_port: Option<u16>,

    pub mqtt_port: Option<u16>,

    pub client_id: String,

    /// Client secret in plaintext; prefer `client_secret_env`.
    pub client_secret: Option<String>,

    /// Environment variable holding the client secret.
    pub client_secret_env: Option<String>,

    /// Network id scoping the event topic.
    pub net_id: String,

    pub timeout: Option<u64>,

    pub refresh_interval: Option<u64>,

    pub freshness_window: Option<u64>,

    /// 0 disables periodic rediscovery.
    pub rediscovery_interval: Option<u64>,

    /// Subscribe to live events. Default: true.
    pub events: Option<bool>,

    pub token_expiry_margin: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "yolocal", "yolocal").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("yolocal");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if it exists), then `YOLOCAL_*` variables.
///
/// Nested keys use a double underscore, e.g.
/// `YOLOCAL_PROFILES__HOME__HOST=192.168.1.20`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("YOLOCAL_").split("__"));

    Ok(figment.extract()?)
}

// ── Profile selection ───────────────────────────────────────────────

/// Build a profile from the hub tooling's `YOLINK_*` variables.
///
/// Returns `None` unless host, client id, and net id are all present.
pub fn env_profile() -> Option<Profile> {
    env_profile_from(|key| std::env::var(key).ok())
}

/// [`env_profile`] with an injectable variable lookup.
pub fn env_profile_from(lookup: impl Fn(&str) -> Option<String>) -> Option<Profile> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let host = non_empty("YOLINK_HOST")?;
    let client_id = non_empty("YOLINK_CLIENT_ID")?;
    let net_id = non_empty("YOLINK_NET_ID").or_else(|| non_empty("YOLINK_NET"))?;

    Some(Profile {
        host,
        client_id,
        net_id,
        client_secret: non_empty("YOLINK_CLIENT_SECRET"),
        ..Profile::default()
    })
}

/// Pick the profile to use.
///
/// An explicit name must exist. Otherwise the configured default profile
/// is used, and failing that the `YOLINK_*` environment.
pub fn select_profile(
    config: &Config,
    name: Option<&str>,
    env: Option<Profile>,
) -> Result<(String, Profile), ConfigError> {
    if let Some(name) = name {
        if name == ENV_PROFILE && !config.profiles.contains_key(name) {
            if let Some(profile) = env {
                return Ok((ENV_PROFILE.into(), profile));
            }
        }
        return config
            .profiles
            .get(name)
            .map(|p| (name.to_owned(), p.clone()))
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() });
    }

    if let Some(default) = config.default_profile.as_deref() {
        if let Some(profile) = config.profiles.get(default) {
            return Ok((default.to_owned(), profile.clone()));
        }
    }
    if config.profiles.len() == 1 {
        if let Some((name, profile)) = config.profiles.iter().next() {
            return Ok((name.clone(), profile.clone()));
        }
    }

    env.map(|p| (ENV_PROFILE.into(), p))
        .ok_or_else(|| ConfigError::NoProfile {
            path: config_path().display().to_string(),
        })
}

// ── Validation & credentials ────────────────────────────────────────

/// Reject profiles the coordinator could not use.
pub fn validate(profile: &Profile) -> Result<(), ConfigError> {
    require_non_empty("host", &profile.host)?;
    require_non_empty("client_id", &profile.client_id)?;
    require_non_empty("net_id", &profile.net_id)?;

    for (field, port) in [("http_port", profile.http_port), ("mqtt_port", profile.mqtt_port)] {
        if port == Some(0) {
            return Err(invalid(field, "must be between 1 and 65535"));
        }
    }
    if profile.timeout == Some(0) {
        return Err(invalid("timeout", "must be at least 1 second"));
    }
    if profile.freshness_window == Some(0) {
        return Err(invalid("freshness_window", "must be at least 1 second"));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Resolve the client secret: named env var first, then plaintext.
pub fn resolve_secret(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.client_secret_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref secret) = profile.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `CoordinatorConfig` from a validated profile.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    validate(profile)?;
    let secret = resolve_secret(profile, profile_name)?;

    let mut credentials = HubCredentials::new(
        profile.host.as_str(),
        profile.client_id.as_str(),
        secret,
        profile.net_id.as_str(),
    );
    if let Some(port) = profile.http_port {
        credentials.http_port = port;
    }
    if let Some(port) = profile.mqtt_port {
        credentials.mqtt_port = port;
    }

    let mut config = CoordinatorConfig::new(credentials);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.refresh_interval_secs = profile.refresh_interval.unwrap_or(defaults.refresh_interval);
    config.freshness_window_secs = profile.freshness_window.unwrap_or(defaults.freshness_window);
    config.rediscovery_interval_secs = profile.rediscovery_interval.unwrap_or(0);
    config.events_enabled = profile.events.unwrap_or(true);
    if let Some(margin) = profile.token_expiry_margin {
        config.token_expiry_margin_secs = margin;
    }
    Ok(config)
}
