// Wire types for the hub's RPC control API.
//
// Every call is a POST of `RpcRequest` to one endpoint; the hub answers with
// an envelope whose `code` field carries the outcome. The envelope's `data`
// is method-specific and is only typed where the client needs it.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope code for a successful call.
pub const SUCCESS_CODE: &str = "000000";

/// Envelope codes meaning the bearer token was refused.
pub const TOKEN_REJECTED_CODES: &[&str] = &["000103", "010104"];

/// Method that lists every device bound to the hub.
pub const DISCOVER_METHOD: &str = "Home.getDeviceList";

// ── Request ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// A call with no target device.
    pub fn home(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target_device: None,
            token: None,
            params: None,
        }
    }

    /// A call addressed to a single device.
    pub fn device(method: impl Into<String>, device_id: &str, device_token: &str) -> Self {
        Self {
            method: method.into(),
            target_device: Some(device_id.to_owned()),
            token: Some(device_token.to_owned()),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

// ── Response envelope ───────────────────────────────────────────────

/// The hub's response envelope.
///
/// `time` is the hub clock in epoch milliseconds, the same clock that stamps
/// MQTT reports.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl RpcResponse {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn is_token_rejected(&self) -> bool {
        TOKEN_REJECTED_CODES.contains(&self.code.as_str())
    }

    pub fn hub_time(&self) -> Option<DateTime<Utc>> {
        self.time.and_then(DateTime::from_timestamp_millis)
    }
}

// ── Devices ─────────────────────────────────────────────────────────

/// A device as reported by `Home.getDeviceList`.
///
/// `token` is the per-device credential the hub requires on every
/// device-addressed call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDevice {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "secret_string")]
    pub token: SecretString,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub app_eui: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub parent_device_id: Option<String>,
}

fn secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Option<Vec<HubDevice>>,
}

/// Result of a `{type}.getState` call.
#[derive(Debug, Clone)]
pub struct StateReply {
    /// The device's full raw state, as returned in the envelope `data`.
    pub data: Map<String, Value>,
    /// Hub clock at the time of the reply.
    pub hub_time: Option<DateTime<Utc>>,
}

/// Result of a `{type}.setState` call.
#[derive(Debug, Clone)]
pub struct CommandReply {
    pub method: String,
    pub hub_time: Option<DateTime<Utc>>,
    pub data: Value,
}
