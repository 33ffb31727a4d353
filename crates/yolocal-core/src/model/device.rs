// ── Device domain types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString};

use yolocal_api::HubDevice;

// ── DeviceId ────────────────────────────────────────────────────────

/// Hub-assigned device identifier. Opaque and stable across rediscovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── DeviceType ──────────────────────────────────────────────────────

/// Hub device type. Types without a registry schema land in `Other` and
/// are kept as descriptors only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceType {
    THSensor,
    DoorSensor,
    LeakSensor,
    MotionSensor,
    VibrationSensor,
    Outlet,
    Lock,
    Siren,
    Other(String),
}

impl DeviceType {
    /// The wire name used in RPC method prefixes, e.g. `"DoorSensor"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::THSensor => "THSensor",
            Self::DoorSensor => "DoorSensor",
            Self::LeakSensor => "LeakSensor",
            Self::MotionSensor => "MotionSensor",
            Self::VibrationSensor => "VibrationSensor",
            Self::Outlet => "Outlet",
            Self::Lock => "Lock",
            Self::Siren => "Siren",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for DeviceType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "THSensor" => Self::THSensor,
            "DoorSensor" => Self::DoorSensor,
            "LeakSensor" => Self::LeakSensor,
            "MotionSensor" => Self::MotionSensor,
            "VibrationSensor" => Self::VibrationSensor,
            "Outlet" => Self::Outlet,
            "Lock" => Self::Lock,
            "Siren" => Self::Siren,
            _ => Self::Other(s),
        }
    }
}

impl From<DeviceType> for String {
    fn from(t: DeviceType) -> Self {
        match t {
            DeviceType::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

// ── DeviceDescriptor ────────────────────────────────────────────────

/// Static identity of a discovered device.
///
/// `display_type` differs from `device_type` for models the hub reports
/// under a generic type (a tilt sensor reports as `DoorSensor`).
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub display_type: String,
    pub model: Option<String>,
    pub parent_id: Option<DeviceId>,
    #[serde(skip)]
    pub(crate) hub: HubDevice,
}

impl DeviceDescriptor {
    /// Whether two descriptors carry the same identity fields.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.device_type == other.device_type
            && self.display_type == other.display_type
            && self.model == other.model
            && self.parent_id == other.parent_id
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Actuator commands. Each applies to exactly one device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommand {
    Lock,
    Unlock,
    #[strum(to_string = "on", serialize = "turn_on")]
    TurnOn,
    #[strum(to_string = "off", serialize = "turn_off")]
    TurnOff,
    Trigger,
    Stop,
}

impl DeviceCommand {
    /// The device type this command targets.
    pub fn target_type(self) -> DeviceType {
        match self {
            Self::Lock | Self::Unlock => DeviceType::Lock,
            Self::TurnOn | Self::TurnOff => DeviceType::Outlet,
            Self::Trigger | Self::Stop => DeviceType::Siren,
        }
    }

    /// `setState` params for this command.
    pub fn params(self) -> Value {
        match self {
            Self::Lock => json!({ "state": "locked" }),
            Self::Unlock => json!({ "state": "unlocked" }),
            Self::TurnOn => json!({ "state": "open" }),
            Self::TurnOff => json!({ "state": "closed" }),
            Self::Trigger => json!({ "state": { "alarm": true } }),
            Self::Stop => json!({ "state": { "alarm": false } }),
        }
    }
}

/// Outcome of a command, as acknowledged by the hub.
///
/// The acknowledgement does not change the cached state; the resulting
/// state arrives through an event or the next refresh.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub device_id: DeviceId,
    pub command: DeviceCommand,
    pub method: String,
    pub hub_time: Option<DateTime<Utc>>,
    pub data: Value,
}
