// ── Reactive door streams ──
//
// Subscription type for consuming door table changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Door;

/// Snapshot of the door table, sorted by `DoorId`.
pub type DoorSnapshot = Arc<Vec<Arc<Door>>>;

/// A subscription to the canonical door table.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via [`changed()`](Self::changed) or by converting to a
/// `Stream`.
pub struct DoorStream {
    current: DoorSnapshot,
    receiver: watch::Receiver<DoorSnapshot>,
}

impl DoorStream {
    pub(crate) fn new(receiver: watch::Receiver<DoorSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time or at the last `changed()`.
    pub fn current(&self) -> &DoorSnapshot {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> DoorSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the owning reconciler has been dropped.
    pub async fn changed(&mut self) -> Option<DoorSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> DoorWatchStream {
        DoorWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a new snapshot each time the table changes.
pub struct DoorWatchStream {
    inner: WatchStream<DoorSnapshot>,
}

impl Stream for DoorWatchStream {
    type Item = DoorSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn changed_tracks_latest_snapshot() {
        let (tx, rx) = watch::channel(DoorSnapshot::default());
        let mut stream = DoorStream::new(rx);
        assert!(stream.current().is_empty());

        tx.send_replace(Arc::new(Vec::new()));
        let snap = stream.changed().await.unwrap();
        assert!(snap.is_empty());

        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_initial_value() {
        let (_tx, rx) = watch::channel(DoorSnapshot::default());
        let mut stream = DoorStream::new(rx).into_stream();
        let first = stream.next().await.unwrap();
        assert!(first.is_empty());
    }
}
