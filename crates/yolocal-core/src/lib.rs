//! Reactive device-state layer between `yolocal-api` and consumers.
//!
//! - **[`Coordinator`]**: lifecycle facade. [`connect()`](Coordinator::connect)
//!   authenticates, discovers devices, fetches a full state snapshot for each,
//!   then starts the MQTT event subscriber and the periodic refresh task.
//!   [`Coordinator::oneshot()`] runs a single fetch-only session for CLI use.
//!
//! - **[`DeviceTable`]**: lock-free storage built on `DashMap` plus `watch`
//!   snapshots. Every state mutation goes through its merge rules, so event
//!   deltas and HTTP snapshots can arrive in any order.
//!
//! - **[`registry`]**: per-device-type attribute schema, capabilities, and
//!   supported commands.
//!
//! - **Domain model** ([`model`]): [`DeviceDescriptor`], [`DeviceState`],
//!   [`DeviceCommand`].

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod stream;

pub use config::CoordinatorConfig;
pub use coordinator::{ConnectionState, Coordinator, Diagnostics};
pub use error::CoreError;
pub use model::{
    AttributeValue, CommandResult, DeviceCommand, DeviceDescriptor, DeviceId, DeviceState,
    DeviceType, StateChange, StateSource, SyncStatus,
};
pub use registry::AttributeKind;
pub use store::DeviceTable;
pub use stream::EntityStream;

pub use yolocal_api::{HubCredentials, ReconnectConfig, SubscriptionState};
