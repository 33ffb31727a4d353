// ── Table subscriptions ──
//
// Readers hold an `EntityStream` to see the device table as a sequence of
// immutable snapshots. Every snapshot is sorted by device id.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{DeviceId, DeviceState};

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Snapshot-based view over one table collection.
///
/// `snapshot()` is stable until [`next_snapshot()`](Self::next_snapshot)
/// advances it; `peek()` always reads the newest one.
pub struct EntityStream<T: Clone + Send + Sync + 'static> {
    seen: Snapshot<T>,
    rx: watch::Receiver<Snapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(rx: watch::Receiver<Snapshot<T>>) -> Self {
        let seen = Arc::clone(&rx.borrow());
        Self { seen, rx }
    }

    pub fn snapshot(&self) -> &Snapshot<T> {
        &self.seen
    }

    pub fn peek(&self) -> Snapshot<T> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait until the table changes and advance to the new snapshot.
    /// `None` once the table is gone.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot<T>> {
        self.rx.changed().await.ok()?;
        self.seen = Arc::clone(&self.rx.borrow_and_update());
        Some(Arc::clone(&self.seen))
    }

    /// Yields the current snapshot immediately, then one per change.
    pub fn into_stream(self) -> SnapshotStream<T> {
        SnapshotStream {
            inner: WatchStream::new(self.rx),
        }
    }
}

impl EntityStream<DeviceState> {
    /// State of `id` in the held snapshot.
    pub fn get(&self, id: &DeviceId) -> Option<Arc<DeviceState>> {
        find_by_id(&self.seen, id, |s| &s.device_id)
    }
}

fn find_by_id<T>(
    items: &[Arc<T>],
    id: &DeviceId,
    key: impl Fn(&T) -> &DeviceId,
) -> Option<Arc<T>> {
    items
        .binary_search_by(|item| key(item).cmp(id))
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
}

/// `Stream` of table snapshots.
pub struct SnapshotStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> Stream for SnapshotStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn states(ids: &[&str]) -> Snapshot<DeviceState> {
        Arc::new(
            ids.iter()
                .map(|id| Arc::new(DeviceState::unknown(DeviceId::from(*id))))
                .collect(),
        )
    }

    #[tokio::test]
    async fn next_snapshot_advances_held_view() {
        let (tx, rx) = watch::channel(states(&["a"]));
        let mut stream = EntityStream::new(rx);
        assert_eq!(stream.snapshot().len(), 1);

        tx.send_replace(states(&["a", "b"]));
        assert_eq!(stream.snapshot().len(), 1);
        assert_eq!(stream.peek().len(), 2);

        let snap = stream.next_snapshot().await.unwrap();
        assert_eq!(snap.len(), 2);
        assert!(stream.get(&DeviceId::from("b")).is_some());
        assert!(stream.get(&DeviceId::from("c")).is_none());

        drop(tx);
        assert!(stream.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn stream_starts_with_current_snapshot() {
        let (_tx, rx) = watch::channel(states(&["door-1"]));
        let mut stream = EntityStream::new(rx).into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first[0].device_id.as_str(), "door-1");
    }
}
