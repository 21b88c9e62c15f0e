// ── Reactive door table ──
//
// Lock-free concurrent storage with O(1) lookups by `DoorId` and by
// `DoorKey`, plus push-based change notification via `watch` channels.
// Writes are serialized by the reconciler; readers never block.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::warn;

use crate::model::{Door, DoorId, DoorKey, DoorStatus};

/// Result of resolving a `DoorKey` through the secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyLookup {
    Unique(DoorId),
    /// Two or more devices share this serial prefix and door index.
    Ambiguous,
    Missing,
}

#[derive(Debug, Clone, Copy)]
enum KeyEntry {
    Unique(DoorId),
    Ambiguous,
}

/// The canonical door table.
///
/// Every mutation rebuilds the sorted snapshot that subscribers receive
/// and bumps a version counter.
pub(crate) struct DoorTable {
    /// Primary storage.
    by_id: DashMap<DoorId, Arc<Door>>,

    /// Secondary index: serial-prefix key -> id. Rebuilt on structural changes.
    by_key: DashMap<DoorKey, KeyEntry>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot sorted by `DoorId`, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<Door>>>>,
}

impl DoorTable {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub(crate) fn get(&self, id: &DoorId) -> Option<Arc<Door>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn resolve_key(&self, key: &DoorKey) -> KeyLookup {
        match self.by_key.get(key).map(|r| *r.value()) {
            Some(KeyEntry::Unique(id)) => KeyLookup::Unique(id),
            Some(KeyEntry::Ambiguous) => KeyLookup::Ambiguous,
            None => KeyLookup::Missing,
        }
    }

    /// Look up a door by key. Ambiguous keys resolve to nothing.
    pub(crate) fn get_by_key(&self, key: &DoorKey) -> Option<Arc<Door>> {
        match self.resolve_key(key) {
            KeyLookup::Unique(id) => self.get(&id),
            KeyLookup::Ambiguous | KeyLookup::Missing => None,
        }
    }

    /// `true` if any door belongs to a device with this serial prefix.
    pub(crate) fn has_serial_prefix(&self, prefix: &str) -> bool {
        self.by_key.iter().any(|r| r.key().serial_prefix == prefix)
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Door>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Door>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the status of one door. Returns `true` if it changed.
    pub(crate) fn set_status(&self, id: &DoorId, status: DoorStatus) -> bool {
        let changed = match self.by_id.get_mut(id) {
            Some(mut entry) if entry.status != status => {
                let mut door = (**entry).clone();
                door.status = status;
                *entry = Arc::new(door);
                true
            }
            _ => false,
        };

        if changed {
            self.publish();
        }
        changed
    }

    /// Upsert every incoming door, then prune ids absent from the input.
    ///
    /// Upserting before pruning avoids a transient empty table. Returns the
    /// table contents from before the call.
    pub(crate) fn replace_all(&self, doors: Vec<Door>) -> HashMap<DoorId, Arc<Door>> {
        let previous: HashMap<DoorId, Arc<Door>> = self
            .by_id
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();

        let incoming: HashSet<DoorId> = doors.iter().map(|d| d.id).collect();
        for door in doors {
            self.by_id.insert(door.id, Arc::new(door));
        }
        self.by_id.retain(|id, _| incoming.contains(id));

        self.rebuild_key_index();
        self.publish();
        previous
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_key_index(&self) {
        let mut index: HashMap<DoorKey, KeyEntry> = HashMap::with_capacity(self.by_id.len());

        for entry in &self.by_id {
            let door = entry.value();
            index
                .entry(door.key.clone())
                .and_modify(|existing| {
                    if let KeyEntry::Unique(other) = *existing {
                        if other != door.id {
                            warn!(
                                key = %door.key,
                                first = %other,
                                second = %door.id,
                                "serial prefix collision; push events for this door are dropped"
                            );
                            *existing = KeyEntry::Ambiguous;
                        }
                    }
                })
                .or_insert(KeyEntry::Unique(door.id));
        }

        self.by_key.clear();
        for (key, entry) in index {
            self.by_key.insert(key, entry);
        }
    }

    /// Rebuild the sorted snapshot, broadcast it, and bump the version.
    fn publish(&self) {
        let mut values: Vec<Arc<Door>> = self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by_key(|d| d.id);
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
