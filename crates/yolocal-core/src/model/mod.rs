// ── Domain model ──
//
// Canonical device and state types. Everything consumers see is defined
// here; raw hub payloads are converted in `crate::convert`.

pub mod device;
pub mod state;

pub use device::{CommandResult, DeviceCommand, DeviceDescriptor, DeviceId, DeviceType};
pub use state::{
    AttributeValue, DeviceState, StateChange, StateDelta, StateSnapshot, StateSource, SyncStatus,
};
