// ── Subscription registry ──
//
// DoorKey -> change callback. Callbacks are cloned out of the map before
// they run, so a callback may register, unregister, or query freely.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::model::DoorKey;

/// Change notification callback. Must not block for long: it runs inline
/// on the push dispatch path.
pub type DoorCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Registered change callbacks, one per door key.
#[derive(Default)]
pub struct SubscriptionRegistry {
    callbacks: DashMap<DoorKey, DoorCallback>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`, replacing any previous registration.
    pub fn register(&self, key: DoorKey, callback: DoorCallback) {
        debug!(%key, "registering door callback");
        if self.callbacks.insert(key, callback).is_some() {
            debug!("replaced existing registration");
        }
    }

    /// Remove the registration for `key`. Returns `false` (and logs a
    /// warning) if there was none.
    pub fn unregister(&self, key: &DoorKey) -> bool {
        if self.callbacks.remove(key).is_some() {
            debug!(%key, "unregistered door callback");
            true
        } else {
            warn!(%key, "unregister called for a door with no callback");
            false
        }
    }

    /// Invoke the callback for `key`, if any.
    pub fn notify(&self, key: &DoorKey) {
        let callback = self.callbacks.get(key).map(|r| Arc::clone(r.value()));
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Invoke every registered callback once.
    pub fn notify_all(&self) {
        let callbacks: Vec<DoorCallback> = self
            .callbacks
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        debug!(count = callbacks.len(), "notifying all subscribers");
        for callback in callbacks {
            callback();
        }
    }

    pub fn contains(&self, key: &DoorKey) -> bool {
        self.callbacks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
