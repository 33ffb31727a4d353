// ── Device state types ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use strum::Display;

use super::device::DeviceId;

/// A single normalized attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Structured values the hub sends as objects (alarm flags, limits).
    Object(Value),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
            Self::Object(v) => v.clone(),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

/// Freshness of a device's cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No snapshot has been applied yet.
    Unknown,
    Synced,
    /// Nothing received within the freshness window; awaiting re-fetch.
    Stale,
}

/// Which channel produced the most recent applied update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Snapshot,
    Event,
}

/// Reconciled state of one device.
///
/// `last_updated` is on the hub's clock and only ever moves forward.
/// `received_at` is the local time the last update was applied and drives
/// staleness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub attributes: IndexMap<String, AttributeValue>,
    pub last_updated: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub source: Option<StateSource>,
    pub status: SyncStatus,
}

impl DeviceState {
    /// Placeholder state for a device that has been discovered but not fetched.
    pub fn unknown(device_id: DeviceId) -> Self {
        Self {
            device_id,
            attributes: IndexMap::new(),
            last_updated: None,
            received_at: None,
            source: None,
            status: SyncStatus::Unknown,
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn is_online(&self) -> Option<bool> {
        self.get("online").and_then(AttributeValue::as_bool)
    }
}

/// Full replacement state from an HTTP fetch.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub attributes: IndexMap<String, AttributeValue>,
    /// Hub envelope time, if the reply carried one.
    pub hub_time: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// Partial update from one event report.
#[derive(Debug, Clone)]
pub struct StateDelta {
    pub attributes: IndexMap<String, AttributeValue>,
    /// Hub report time, if the payload carried one.
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

impl StateDelta {
    /// Ordering timestamp. Falls back to the local receive time when the
    /// hub omitted one.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(self.received_at)
    }
}

/// Notification emitted whenever a device's state changes.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub device_id: DeviceId,
    /// Attribute names whose value changed. Empty for a pure status change.
    pub changed: Vec<String>,
    pub state: Arc<DeviceState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_value_serializes_untagged() {
        let mut state = DeviceState::unknown(DeviceId::from("d1"));
        state.attributes.insert("state".into(), AttributeValue::Text("open".into()));
        state.attributes.insert("battery".into(), AttributeValue::Integer(4));
        state.attributes.insert("online".into(), AttributeValue::Bool(true));

        let value = serde_json::to_value(&state).unwrap_or_default();
        assert_eq!(value["attributes"], json!({"state": "open", "battery": 4, "online": true}));
        assert_eq!(value["status"], json!("unknown"));
        assert_eq!(state.is_online(), Some(true));
    }

    #[test]
    fn delta_time_falls_back_to_receipt() {
        let now = Utc::now();
        let delta = StateDelta {
            attributes: IndexMap::new(),
            timestamp: None,
            received_at: now,
        };
        assert_eq!(delta.effective_time(), now);
        assert_eq!(SyncStatus::Stale.to_string(), "stale");
    }
}
