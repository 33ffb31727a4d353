// ── State merge rules ──
//
// Pure functions applying snapshots and deltas to a `DeviceState`. The
// device table runs them under the per-device shard lock, so each call is
// an atomic read-modify-write.

use chrono::{DateTime, Utc};

use crate::model::{DeviceState, StateDelta, StateSnapshot, StateSource, SyncStatus};

/// What happened to a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged. `changed` lists attributes whose value differs from before.
    Applied { changed: Vec<String> },
    /// Same timestamp and same values as the current state.
    Duplicate,
    /// Older than the current state.
    Outdated,
    /// No snapshot has been applied yet, so there is nothing to merge into.
    NoBaseline,
}

/// Replace the whole attribute set with `snapshot`.
///
/// Returns the names of attributes that were added, changed, or removed.
/// `last_updated` never moves backwards.
pub fn apply_snapshot(state: &mut DeviceState, snapshot: StateSnapshot) -> Vec<String> {
    let mut changed: Vec<String> = snapshot
        .attributes
        .iter()
        .filter(|(name, value)| state.attributes.get(*name) != Some(value))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(
        state
            .attributes
            .keys()
            .filter(|name| !snapshot.attributes.contains_key(*name))
            .cloned(),
    );

    let snapshot_time = snapshot.hub_time.unwrap_or(snapshot.received_at);
    state.attributes = snapshot.attributes;
    state.last_updated = Some(max_time(state.last_updated, snapshot_time));
    state.received_at = Some(snapshot.received_at);
    state.source = Some(StateSource::Snapshot);
    state.status = SyncStatus::Synced;

    changed
}

/// Merge the attributes present in `delta`, leaving all others untouched.
pub fn apply_delta(state: &mut DeviceState, delta: StateDelta) -> MergeOutcome {
    if state.status == SyncStatus::Unknown {
        return MergeOutcome::NoBaseline;
    }

    let delta_time = delta.effective_time();
    if state.last_updated.is_some_and(|last| delta_time < last) {
        return MergeOutcome::Outdated;
    }

    let changed: Vec<String> = delta
        .attributes
        .iter()
        .filter(|(name, value)| state.attributes.get(*name) != Some(value))
        .map(|(name, _)| name.clone())
        .collect();

    if changed.is_empty() && state.last_updated == Some(delta_time) {
        return MergeOutcome::Duplicate;
    }

    for (name, value) in delta.attributes {
        state.attributes.insert(name, value);
    }
    state.last_updated = Some(max_time(state.last_updated, delta_time));
    state.received_at = Some(delta.received_at);
    state.source = Some(StateSource::Event);
    state.status = SyncStatus::Synced;

    MergeOutcome::Applied { changed }
}

/// Mark a synced state stale if nothing was received within `window`.
/// Returns `true` if the status changed.
pub fn mark_stale_if_expired(
    state: &mut DeviceState,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    if state.status != SyncStatus::Synced {
        return false;
    }
    let expired = state
        .received_at
        .is_none_or(|received| now.signed_duration_since(received) > window);
    if expired {
        state.status = SyncStatus::Stale;
    }
    expired
}

fn max_time(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    current.map_or(candidate, |c| c.max(candidate))
}
