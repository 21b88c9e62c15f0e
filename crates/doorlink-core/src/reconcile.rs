// ── State reconciliation ──
//
// Merges full snapshots and push events into the canonical door table.
// All table writes happen under `writer`; registry callbacks always run
// after it is released.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::convert::{PushEvent, parse_push_frame};
use crate::model::{Door, DoorId, DoorKey, DoorStatus, serial_prefix};
use crate::provider::SnapshotProvider;
use crate::registry::SubscriptionRegistry;
use crate::store::{DoorTable, KeyLookup};
use crate::stream::DoorSnapshot;

/// Device-level status meaning the device dropped off the service.
const DEVICE_OFFLINE: i64 = 0;

/// Result of applying a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    /// The canonical table after the snapshot, sorted by `DoorId`.
    pub doors: DoorSnapshot,
    /// The polling anchor disagreed with the live table: push updates
    /// are not arriving and the push connection should be restarted.
    pub restart_required: bool,
}

#[derive(Debug, Default)]
struct WriterState {
    /// First door of the first snapshot, re-picked if it disappears.
    anchor: Option<DoorId>,
    seen_snapshot: bool,
}

/// Owns the canonical door table.
pub struct Reconciler {
    table: DoorTable,
    registry: Arc<SubscriptionRegistry>,
    snapshots: Arc<dyn SnapshotProvider>,
    serial_prefix_len: usize,
    writer: Mutex<WriterState>,
}

impl Reconciler {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        registry: Arc<SubscriptionRegistry>,
        serial_prefix_len: usize,
    ) -> Self {
        Self {
            table: DoorTable::new(),
            registry,
            snapshots,
            serial_prefix_len,
            writer: Mutex::new(WriterState::default()),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Replace the table with a full snapshot.
    ///
    /// Every identity whose status changed (including doors that appeared
    /// or vanished) is notified once.
    pub fn apply_snapshot(&self, doors: Vec<Door>) -> SnapshotOutcome {
        let (outcome, to_notify) = self.replace_table(doors);
        for key in &to_notify {
            self.registry.notify(key);
        }
        outcome
    }

    /// Swap in a snapshot and return the identities whose status changed,
    /// without notifying them.
    fn replace_table(&self, doors: Vec<Door>) -> (SnapshotOutcome, BTreeSet<DoorKey>) {
        let first_in_snapshot = doors.first().map(|d| d.id);

        let (restart_required, to_notify) = {
            let mut state = self.lock_writer();

            let restart_required = match state.anchor {
                Some(anchor) if state.seen_snapshot => {
                    let live = self.table.get(&anchor).map(|d| d.status);
                    let polled = doors.iter().find(|d| d.id == anchor).map(|d| d.status);
                    match (live, polled) {
                        (Some(live), Some(polled)) if live != polled => {
                            info!(
                                %anchor,
                                %live,
                                %polled,
                                "polling anchor disagrees with live state"
                            );
                            true
                        }
                        _ => false,
                    }
                }
                _ => false,
            };

            let previous = self.table.replace_all(doors);

            if state.anchor.is_none_or(|id| self.table.get(&id).is_none()) {
                state.anchor = first_in_snapshot;
                debug!(anchor = ?state.anchor, "polling anchor selected");
            }
            state.seen_snapshot = true;

            let snapshot = self.table.snapshot();
            let mut to_notify: BTreeSet<DoorKey> = BTreeSet::new();
            for door in &*snapshot {
                if previous.get(&door.id).map(|d| d.status) != Some(door.status) {
                    to_notify.insert(door.key.clone());
                }
            }
            for (id, door) in &previous {
                if self.table.get(id).is_none() {
                    to_notify.insert(door.key.clone());
                }
            }

            (restart_required, to_notify)
        };

        debug!(
            doors = self.table.len(),
            changed = to_notify.len(),
            restart_required,
            "snapshot applied"
        );

        let outcome = SnapshotOutcome {
            doors: self.table.snapshot(),
            restart_required,
        };
        (outcome, to_notify)
    }

    // ── Push events ──────────────────────────────────────────────────

    /// Apply one push message.
    ///
    /// `None` is the resync directive: a fresh snapshot is fetched and
    /// applied, then every subscriber is notified exactly once. Returns
    /// `false` only when the message means the push connection must be
    /// restarted.
    pub async fn apply_push_event(&self, raw: Option<&str>) -> bool {
        match raw {
            None => {
                self.resync().await;
                true
            }
            Some(raw) => self.apply_push_text(raw),
        }
    }

    async fn resync(&self) {
        info!("resynchronizing from snapshot");
        match self.snapshots.fetch_all_doors().await {
            Ok(doors) => {
                self.replace_table(doors);
                self.registry.notify_all();
            }
            Err(e) => warn!(error = %e, "resync snapshot failed"),
        }
    }

    fn apply_push_text(&self, raw: &str) -> bool {
        let events = match parse_push_frame(raw) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "malformed push frame dropped");
                return true;
            }
        };
        if events.is_empty() {
            trace!("push frame ignored");
        }

        for event in events {
            match event {
                PushEvent::DeviceStatus { serial, status } => {
                    let prefix = serial_prefix(&serial, self.serial_prefix_len);
                    if status == DEVICE_OFFLINE && self.table.has_serial_prefix(prefix) {
                        info!(serial = %serial, "device reported offline, push restart required");
                        return false;
                    }
                    trace!(serial = %serial, status, "device status ignored");
                }
                PushEvent::DoorStatus {
                    serial,
                    door,
                    status,
                } => {
                    let key = DoorKey::from_serial(&serial, door, self.serial_prefix_len);
                    if self.apply_door_status(&key, status) {
                        self.registry.notify(&key);
                    }
                }
            }
        }
        true
    }

    /// Store `status` for `key`. Returns `true` if the table changed.
    fn apply_door_status(&self, key: &DoorKey, status: DoorStatus) -> bool {
        let _writer = self.lock_writer();

        match self.table.resolve_key(key) {
            KeyLookup::Unique(id) => {
                let changed = self.table.set_status(&id, status);
                if changed {
                    debug!(%id, %status, "door status updated from push");
                } else {
                    trace!(%id, %status, "duplicate door status");
                }
                changed
            }
            KeyLookup::Ambiguous => {
                warn!(%key, "push event for ambiguous serial prefix dropped");
                false
            }
            KeyLookup::Missing => {
                debug!(%key, "push event for unknown door");
                false
            }
        }
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn door(&self, id: &DoorId) -> Option<Arc<Door>> {
        self.table.get(id)
    }

    pub fn door_by_key(&self, key: &DoorKey) -> Option<Arc<Door>> {
        self.table.get_by_key(key)
    }

    pub fn status(&self, id: &DoorId) -> Option<DoorStatus> {
        self.table.get(id).map(|d| d.status)
    }

    pub fn doors(&self) -> DoorSnapshot {
        self.table.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<DoorSnapshot> {
        self.table.subscribe()
    }

    /// Mutation counter of the table.
    pub fn version(&self) -> u64 {
        self.table.version()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn serial_prefix_len(&self) -> usize {
        self.serial_prefix_len
    }
}
