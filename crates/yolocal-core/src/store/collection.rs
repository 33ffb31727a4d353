// ── Keyed copy-on-write collection ──
//
// One per table column (descriptors, states). Point reads go to the
// `DashMap`; bulk readers get the id-sorted vector published on `watch`.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::DeviceId;

type Sorted<T> = Arc<Vec<Arc<T>>>;

/// Entries are `Arc`ed and mutated through `Arc::make_mut`, so a published
/// vector is never affected by later writes.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    entries: DashMap<DeviceId, Arc<T>>,
    published: watch::Sender<Sorted<T>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            published: watch::Sender::new(Arc::new(Vec::new())),
        }
    }

    /// Store `value` under `id`. `true` when `id` was not present before.
    pub(crate) fn upsert(&self, id: DeviceId, value: T) -> bool {
        let fresh = self.entries.insert(id, Arc::new(value)).is_none();
        self.publish();
        fresh
    }

    pub(crate) fn insert_if_absent(&self, id: DeviceId, make: impl FnOnce() -> T) -> bool {
        let Entry::Vacant(slot) = self.entries.entry(id) else {
            return false;
        };
        slot.insert(Arc::new(make()));
        self.publish();
        true
    }

    /// Run `f` against the stored value while holding its shard lock.
    ///
    /// `f` reports whether it changed anything; nothing is published
    /// otherwise. `None` when `id` is absent.
    pub(crate) fn modify<R>(
        &self,
        id: &DeviceId,
        f: impl FnOnce(&mut T) -> (R, bool),
    ) -> Option<(R, Arc<T>)> {
        let (out, dirty, after) = {
            let mut slot = self.entries.get_mut(id)?;
            let (out, dirty) = f(Arc::make_mut(slot.value_mut()));
            (out, dirty, Arc::clone(slot.value()))
        };
        if dirty {
            self.publish();
        }
        Some((out, after))
    }

    pub(crate) fn remove(&self, id: &DeviceId) -> Option<Arc<T>> {
        let (_, gone) = self.entries.remove(id)?;
        self.publish();
        Some(gone)
    }

    /// Drop every entry whose id fails `keep`. Returns the dropped ids.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&DeviceId) -> bool) -> Vec<DeviceId> {
        let mut dropped = Vec::new();
        self.entries.retain(|id, _| {
            let kept = keep(id);
            if !kept {
                dropped.push(id.clone());
            }
            kept
        });
        if !dropped.is_empty() {
            dropped.sort();
            self.publish();
        }
        dropped
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<Arc<T>> {
        self.entries.get(id).map(|slot| Arc::clone(slot.value()))
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn ids(&self) -> Vec<DeviceId> {
        self.entries.iter().map(|slot| slot.key().clone()).collect()
    }

    pub(crate) fn snapshot(&self) -> Sorted<T> {
        Arc::clone(&self.published.borrow())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Sorted<T>> {
        self.published.subscribe()
    }

    // Rebuilt inside `send_modify` so concurrent writers serialize here and
    // the last publish covers every completed write.
    fn publish(&self) {
        self.published.send_modify(|sorted| {
            let mut pairs: Vec<(DeviceId, Arc<T>)> = self
                .entries
                .iter()
                .map(|slot| (slot.key().clone(), Arc::clone(slot.value())))
                .collect();
            pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            *sorted = Arc::new(pairs.into_iter().map(|(_, v)| v).collect());
        });
    }
}
