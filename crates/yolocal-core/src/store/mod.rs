// ── Reactive device store ──
//
// Lock-free device storage with push-based change notification.

mod collection;
mod device_table;
pub mod merge;

pub use device_table::{DeviceTable, DiscoveryDiff};
pub use merge::MergeOutcome;
