// ── Device registry ──
//
// Per-type attribute schema and capabilities. The schema decides which raw
// hub fields become `DeviceState` attributes and how they are typed; values
// are transported as-is, never converted between units.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::model::{AttributeValue, DeviceCommand, DeviceType};

/// Expected JSON shape of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Bool,
    Integer,
    /// Any JSON number, stored as a float.
    Number,
    Text,
    /// JSON object or array, kept verbatim.
    Object,
    /// Any non-null value, typed by its JSON shape.
    Any,
}

type Schema = &'static [(&'static str, AttributeKind)];

const COMMON: Schema = &[
    ("online", AttributeKind::Bool),
    ("reportAt", AttributeKind::Any),
    ("battery", AttributeKind::Integer),
    ("version", AttributeKind::Text),
    ("loraInfo", AttributeKind::Object),
];

const TH_SENSOR: Schema = &[
    ("state", AttributeKind::Text),
    ("temperature", AttributeKind::Number),
    ("humidity", AttributeKind::Number),
    ("mode", AttributeKind::Text),
    ("tempUnit", AttributeKind::Text),
    ("interval", AttributeKind::Integer),
    ("tempCorrection", AttributeKind::Number),
    ("humidityCorrection", AttributeKind::Number),
    ("tempLimit", AttributeKind::Object),
    ("humidityLimit", AttributeKind::Object),
    ("alarm", AttributeKind::Object),
    ("batteryType", AttributeKind::Text),
];

const DOOR_SENSOR: Schema = &[
    ("state", AttributeKind::Text),
    ("delay", AttributeKind::Integer),
    ("openRemindDelay", AttributeKind::Integer),
    ("alertInterval", AttributeKind::Integer),
    ("devTemperature", AttributeKind::Number),
];

const LEAK_SENSOR: Schema = &[
    ("state", AttributeKind::Text),
    ("alarmState", AttributeKind::Object),
    ("devTemperature", AttributeKind::Number),
    ("interval", AttributeKind::Integer),
    ("sensorMode", AttributeKind::Text),
];

const MOTION_SENSOR: Schema = &[
    ("state", AttributeKind::Text),
    ("devTemperature", AttributeKind::Number),
    ("sensitivity", AttributeKind::Integer),
    ("nomotionDelay", AttributeKind::Integer),
    ("alertInterval", AttributeKind::Integer),
    ("ledAlarm", AttributeKind::Bool),
];

const VIBRATION_SENSOR: Schema = &[
    ("state", AttributeKind::Text),
    ("devTemperature", AttributeKind::Number),
    ("sensitivity", AttributeKind::Integer),
    ("noVibrationDelay", AttributeKind::Integer),
    ("alertInterval", AttributeKind::Integer),
];

const OUTLET: Schema = &[("state", AttributeKind::Text)];

const LOCK: Schema = &[("state", AttributeKind::Text)];

const SIREN: Schema = &[
    ("state", AttributeKind::Text),
    ("alarm", AttributeKind::Any),
    ("powerSupply", AttributeKind::Text),
];

/// Envelope fields that are not device attributes.
const METADATA_KEYS: &[&str] = &["deviceId", "targetDevice", "event", "time"];

fn schema(device_type: &DeviceType) -> Option<Schema> {
    match device_type {
        DeviceType::THSensor => Some(TH_SENSOR),
        DeviceType::DoorSensor => Some(DOOR_SENSOR),
        DeviceType::LeakSensor => Some(LEAK_SENSOR),
        DeviceType::MotionSensor => Some(MOTION_SENSOR),
        DeviceType::VibrationSensor => Some(VIBRATION_SENSOR),
        DeviceType::Outlet => Some(OUTLET),
        DeviceType::Lock => Some(LOCK),
        DeviceType::Siren => Some(SIREN),
        DeviceType::Other(_) => None,
    }
}

// ── Queries ─────────────────────────────────────────────────────────

/// Whether devices of this type get a reconciled `DeviceState`.
pub fn is_supported(device_type: &DeviceType) -> bool {
    schema(device_type).is_some()
}

/// Capability tags for a device type. Empty for unsupported types.
pub fn capabilities(device_type: &DeviceType) -> BTreeSet<&'static str> {
    let tags: &[&'static str] = match device_type {
        DeviceType::THSensor => &["battery", "humidity", "temperature"],
        DeviceType::DoorSensor => &["battery", "contact"],
        DeviceType::LeakSensor => &["battery", "leak"],
        DeviceType::MotionSensor => &["battery", "motion"],
        DeviceType::VibrationSensor => &["battery", "vibration"],
        DeviceType::Outlet => &["switch"],
        DeviceType::Lock => &["battery", "lock"],
        DeviceType::Siren => &["siren"],
        DeviceType::Other(_) => &[],
    };
    tags.iter().copied().collect()
}

/// Expected kind of `name` for this device type, if it is a schema attribute.
pub fn attribute_kind(device_type: &DeviceType, name: &str) -> Option<AttributeKind> {
    let specific = schema(device_type)?;
    specific
        .iter()
        .chain(COMMON)
        .find(|(key, _)| *key == name)
        .map(|(_, kind)| *kind)
}

pub fn supports_command(device_type: &DeviceType, command: DeviceCommand) -> bool {
    is_supported(device_type) && command.target_type() == *device_type
}

// ── Normalization ───────────────────────────────────────────────────

/// Result of normalizing a raw hub payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Schema attributes, in schema order.
    pub attributes: IndexMap<String, AttributeValue>,
    /// Names of fields dropped as unknown or mistyped.
    pub rejected: Vec<String>,
}

/// Turn a raw hub state map into typed attributes.
///
/// The hub nests most fields under a `state` object whose own `state` key
/// is the primary value; nested fields win over top-level ones. Null values
/// are treated as absent.
pub fn normalize(device_type: &DeviceType, raw: &Map<String, Value>) -> Normalized {
    let Some(specific) = schema(device_type) else {
        return Normalized::default();
    };

    let flat = flatten(raw);
    let mut normalized = Normalized::default();

    for (name, kind) in specific.iter().chain(COMMON) {
        if let Some(value) = flat.get(*name) {
            match coerce(*kind, value) {
                Some(v) => {
                    normalized.attributes.insert((*name).to_owned(), v);
                }
                None if value.is_null() => {}
                None => normalized.rejected.push((*name).to_owned()),
            }
        }
    }

    for name in flat.keys() {
        let known = specific
            .iter()
            .chain(COMMON)
            .any(|(key, _)| *key == name.as_str());
        if !known && !METADATA_KEYS.contains(&name.as_str()) {
            normalized.rejected.push(name.clone());
        }
    }

    normalized
}

fn flatten(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in raw {
        if key != "state" || !value.is_object() {
            flat.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(nested)) = raw.get("state") {
        for (key, value) in nested {
            flat.insert(key.clone(), value.clone());
        }
    }
    flat
}

fn coerce(kind: AttributeKind, value: &Value) -> Option<AttributeValue> {
    match (kind, value) {
        (_, Value::Null) => None,
        (AttributeKind::Bool, Value::Bool(b)) => Some(AttributeValue::Bool(*b)),
        (AttributeKind::Integer, Value::Number(n)) => n.as_i64().map(AttributeValue::Integer),
        (AttributeKind::Number, Value::Number(n)) => n.as_f64().map(AttributeValue::Float),
        (AttributeKind::Text, Value::String(s)) => Some(AttributeValue::Text(s.clone())),
        (AttributeKind::Object, Value::Object(_) | Value::Array(_)) => {
            Some(AttributeValue::Object(value.clone()))
        }
        (AttributeKind::Any, v) => Some(natural(v)),
        _ => None,
    }
}

fn natural(value: &Value) -> AttributeValue {
    match value {
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => n.as_i64().map_or_else(
            || AttributeValue::Float(n.as_f64().unwrap_or_default()),
            AttributeValue::Integer,
        ),
        Value::String(s) => AttributeValue::Text(s.clone()),
        other => AttributeValue::Object(other.clone()),
    }
}
