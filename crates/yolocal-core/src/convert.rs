// ── API-to-domain type conversions ──
//
// Bridges raw `yolocal_api` payloads into canonical `yolocal_core::model`
// types. Attribute typing is delegated to the registry.

use chrono::{DateTime, Utc};

use yolocal_api::{DeviceEvent, HubDevice, StateReply};

use crate::model::{DeviceDescriptor, DeviceId, DeviceType, StateDelta, StateSnapshot};
use crate::registry::{self, Normalized};

/// Four-digit model number embedded in the hub's `appEui`.
pub fn model_number(app_eui: Option<&str>) -> Option<&str> {
    app_eui.and_then(|eui| eui.get(6..10))
}

/// Display type override for models the hub reports under a generic type.
fn display_type(raw_type: &str, model_num: Option<&str>) -> String {
    match model_num {
        Some("7706") => "TiltSensor".into(),
        Some("8004") => "TempSensor".into(),
        _ => raw_type.to_owned(),
    }
}

impl From<HubDevice> for DeviceDescriptor {
    fn from(hub: HubDevice) -> Self {
        let model_num = model_number(hub.app_eui.as_deref());
        let model = model_num
            .map(|n| format!("YS{n}-UC"))
            .or_else(|| hub.model_name.clone());

        Self {
            id: DeviceId::from(hub.device_id.clone()),
            name: hub.name.clone(),
            device_type: DeviceType::from(hub.device_type.clone()),
            display_type: display_type(&hub.device_type, model_num),
            model,
            parent_id: hub.parent_device_id.clone().map(DeviceId::from),
            hub,
        }
    }
}

/// Normalize an HTTP state reply into a snapshot.
pub fn snapshot_from_reply(
    device_type: &DeviceType,
    reply: &StateReply,
    received_at: DateTime<Utc>,
) -> (StateSnapshot, Vec<String>) {
    let Normalized {
        attributes,
        rejected,
    } = registry::normalize(device_type, &reply.data);
    (
        StateSnapshot {
            attributes,
            hub_time: reply.hub_time,
            received_at,
        },
        rejected,
    )
}

/// Normalize an MQTT report into a delta.
pub fn delta_from_event(device_type: &DeviceType, event: &DeviceEvent) -> (StateDelta, Vec<String>) {
    let Normalized {
        attributes,
        rejected,
    } = registry::normalize(device_type, &event.data);
    (
        StateDelta {
            attributes,
            timestamp: event.timestamp,
            received_at: event.received_at,
        },
        rejected,
    )
}
