// ── Runtime coordinator configuration ──
//
// Describes how to reach one hub and how aggressively to keep state fresh.
// Carries credentials but never touches disk; the CLI builds one from a
// config profile and hands it in.

use std::time::Duration;

use yolocal_api::{HubCredentials, ReconnectConfig};

/// Configuration for a single hub coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub credentials: HubCredentials,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// How often the refresh cycle runs (seconds). 0 = never.
    pub refresh_interval_secs: u64,
    /// A device whose last received state is older than this is marked
    /// stale and re-fetched on the next refresh cycle.
    pub freshness_window_secs: u64,
    /// How often to re-run discovery (seconds). 0 = only at connect.
    pub rediscovery_interval_secs: u64,
    /// Start the MQTT event subscriber after the initial snapshot.
    pub events_enabled: bool,
    pub reconnect: ReconnectConfig,
    /// Treat tokens as expired this long before their stated expiry.
    pub token_expiry_margin_secs: u64,
}

impl CoordinatorConfig {
    pub fn new(credentials: HubCredentials) -> Self {
        Self {
            credentials,
            timeout: Duration::from_secs(10),
            refresh_interval_secs: 300,
            freshness_window_secs: 3600,
            rediscovery_interval_secs: 0,
            events_enabled: true,
            reconnect: ReconnectConfig::default(),
            token_expiry_margin_secs: 60,
        }
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}
