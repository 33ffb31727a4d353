// ── Device table ──
//
// Descriptors and reconciled states for every discovered device. The only
// place `DeviceState` is mutated; all writes go through `merge`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use super::collection::EntityCollection;
use super::merge::{self, MergeOutcome};
use crate::model::{
    DeviceDescriptor, DeviceId, DeviceState, StateChange, StateDelta, StateSnapshot, SyncStatus,
};
use crate::registry;
use crate::stream::EntityStream;

const CHANGE_CHANNEL_SIZE: usize = 256;

/// What a discovery pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryDiff {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
    pub updated: Vec<DeviceId>,
}

/// Reactive store of device descriptors and states.
///
/// Reads are wait-free snapshots; writes take the per-device shard lock
/// for the duration of one merge.
pub struct DeviceTable {
    descriptors: EntityCollection<DeviceDescriptor>,
    states: EntityCollection<DeviceState>,
    changes: broadcast::Sender<StateChange>,
    last_discovery: watch::Sender<Option<DateTime<Utc>>>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (last_discovery, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            descriptors: EntityCollection::new(),
            states: EntityCollection::new(),
            changes,
            last_discovery,
            last_event,
        }
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Replace the descriptor set with a fresh discovery result.
    ///
    /// Upserts first, then prunes, so readers never observe an empty table.
    /// Supported devices get an `Unknown` state if they have none, or if the
    /// hub now reports a different type for them. States of vanished or
    /// unsupported devices are dropped.
    pub fn apply_discovery(&self, discovered: Vec<DeviceDescriptor>) -> DiscoveryDiff {
        let mut diff = DiscoveryDiff::default();
        let incoming: HashSet<DeviceId> = discovered.iter().map(|d| d.id.clone()).collect();

        for descriptor in discovered {
            let id = descriptor.id.clone();
            let supported = registry::is_supported(&descriptor.device_type);

            let retyped = match self.descriptors.get(&id) {
                None => {
                    diff.added.push(id.clone());
                    false
                }
                Some(existing) if !existing.same_identity(&descriptor) => {
                    diff.updated.push(id.clone());
                    existing.device_type != descriptor.device_type
                }
                Some(_) => false,
            };
            self.descriptors.upsert(id.clone(), descriptor);

            if supported && retyped {
                // Attributes were typed under the old schema.
                self.states
                    .upsert(id.clone(), DeviceState::unknown(id.clone()));
                if let Some(state) = self.states.get(&id) {
                    self.notify(&id, Vec::new(), state);
                }
            } else if supported {
                let state_id = id.clone();
                self.states
                    .insert_if_absent(id, || DeviceState::unknown(state_id));
            } else {
                self.states.remove(&id);
            }
        }

        diff.removed = self.descriptors.retain(|id| incoming.contains(id));
        self.states.retain(|id| incoming.contains(id));

        self.last_discovery.send_replace(Some(Utc::now()));
        diff
    }

    // ── State merges ─────────────────────────────────────────────────

    /// Apply a full snapshot. Returns the changed attribute names, or `None`
    /// if the device has no state slot (unknown or unsupported).
    pub fn apply_snapshot(&self, id: &DeviceId, snapshot: StateSnapshot) -> Option<Vec<String>> {
        let (changed, state) = self.states.modify(id, |state| {
            let was = state.status;
            let changed = merge::apply_snapshot(state, snapshot);
            let status_changed = was != state.status;
            let notify = !changed.is_empty() || status_changed;
            ((changed, notify), true)
        })?;

        let (changed, notify) = changed;
        if notify {
            self.notify(id, changed.clone(), state);
        }
        Some(changed)
    }

    /// Apply an event delta. Returns `None` if the device has no state slot.
    pub fn apply_delta(&self, id: &DeviceId, delta: StateDelta) -> Option<MergeOutcome> {
        let (outcome, state) = self.states.modify(id, |state| {
            let outcome = merge::apply_delta(state, delta);
            let applied = matches!(outcome, MergeOutcome::Applied { .. });
            (outcome, applied)
        })?;

        self.last_event.send_replace(Some(Utc::now()));
        if let MergeOutcome::Applied { changed } = &outcome {
            if !changed.is_empty() {
                self.notify(id, changed.clone(), state);
            }
        }
        Some(outcome)
    }

    /// Mark every synced device not heard from within `window` as stale.
    /// Returns the ids that transitioned.
    pub fn sweep_stale(&self, now: DateTime<Utc>, window: chrono::Duration) -> Vec<DeviceId> {
        let mut marked = Vec::new();
        for id in self.states.ids() {
            let result = self.states.modify(&id, |state| {
                let stale = merge::mark_stale_if_expired(state, now, window);
                (stale, stale)
            });
            if let Some((true, state)) = result {
                self.notify(&id, Vec::new(), state);
                marked.push(id);
            }
        }
        marked
    }

    fn notify(&self, id: &DeviceId, changed: Vec<String>, state: Arc<DeviceState>) {
        // No receivers is fine.
        let _ = self.changes.send(StateChange {
            device_id: id.clone(),
            changed,
            state,
        });
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn descriptor(&self, id: &DeviceId) -> Option<Arc<DeviceDescriptor>> {
        self.descriptors.get(id)
    }

    /// Find a descriptor by exact id, then by case-insensitive name.
    pub fn find_descriptor(&self, id_or_name: &str) -> Option<Arc<DeviceDescriptor>> {
        self.descriptors.get(&DeviceId::from(id_or_name)).or_else(|| {
            self.descriptors
                .snapshot()
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(id_or_name))
                .cloned()
        })
    }

    /// Every discovered device, supported or not.
    pub fn descriptors_snapshot(&self) -> Arc<Vec<Arc<DeviceDescriptor>>> {
        self.descriptors.snapshot()
    }

    /// Devices with a reconciled state.
    pub fn supported_descriptors(&self) -> Vec<Arc<DeviceDescriptor>> {
        self.descriptors
            .snapshot()
            .iter()
            .filter(|d| self.states.contains(&d.id))
            .cloned()
            .collect()
    }

    pub fn state(&self, id: &DeviceId) -> Option<Arc<DeviceState>> {
        self.states.get(id)
    }

    pub fn states_snapshot(&self) -> Arc<Vec<Arc<DeviceState>>> {
        self.states.snapshot()
    }

    /// Devices that need a fetch: never synced or gone stale.
    pub fn refresh_candidates(&self) -> Vec<DeviceId> {
        self.states
            .snapshot()
            .iter()
            .filter(|s| matches!(s.status, SyncStatus::Unknown | SyncStatus::Stale))
            .map(|s| s.device_id.clone())
            .collect()
    }

    pub fn supported_ids(&self) -> Vec<DeviceId> {
        self.states
            .snapshot()
            .iter()
            .map(|s| s.device_id.clone())
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.descriptors.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_states(&self) -> EntityStream<DeviceState> {
        EntityStream::new(self.states.subscribe())
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_discovery(&self) -> Option<DateTime<Utc>> {
        *self.last_discovery.borrow()
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }
}
