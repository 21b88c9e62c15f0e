// Shared fakes for doorlink-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use doorlink_core::{
    CommandChannel, CommandError, CoreError, CredentialSource, Door, DoorCommand, DoorFault,
    DoorId, DoorKey, DoorStatus, LinkStatus, SnapshotError, SnapshotProvider,
};

// ── Builders ────────────────────────────────────────────────────────

pub fn door(device_id: u64, index: u8, serial: &str, status: DoorStatus) -> Door {
    Door {
        id: DoorId::new(device_id, index),
        key: DoorKey::from_serial(serial, index, 12),
        status,
        link_status: LinkStatus::Connected,
        battery_level: 100,
        rssi: -59,
        ble_strength: 0,
        fault: DoorFault::None,
        device_online: true,
        name: format!("door {index}"),
        vendor: Some("GENIE".into()),
        model: Some("02".into()),
        serial: serial.to_owned(),
    }
}

/// Callback that counts its invocations.
pub fn counter() -> (Arc<AtomicUsize>, doorlink_core::DoorCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (
        count,
        Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

pub fn hits(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}

// ── Snapshot provider ───────────────────────────────────────────────

/// Serves the current door list; can be told to fail.
#[derive(Default)]
pub struct FakeSnapshots {
    doors: Mutex<Vec<Door>>,
    failures: Mutex<VecDeque<SnapshotError>>,
    pub calls: AtomicUsize,
}

impl FakeSnapshots {
    pub fn new(doors: Vec<Door>) -> Arc<Self> {
        Arc::new(Self {
            doors: Mutex::new(doors),
            ..Self::default()
        })
    }

    pub fn set_doors(&self, doors: Vec<Door>) {
        *self.doors.lock().unwrap() = doors;
    }

    /// Queue errors returned by the next calls, in order.
    pub fn fail_with(&self, errors: impl IntoIterator<Item = SnapshotError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for FakeSnapshots {
    async fn fetch_all_doors(&self) -> Result<Vec<Door>, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.doors.lock().unwrap().clone())
    }
}

// ── Command channel ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCommands {
    pub sent: Mutex<Vec<(DoorId, DoorCommand)>>,
    failures: Mutex<VecDeque<CommandError>>,
}

impl FakeCommands {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, errors: impl IntoIterator<Item = CommandError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn sent(&self) -> Vec<(DoorId, DoorCommand)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandChannel for FakeCommands {
    async fn send_command(&self, id: &DoorId, command: DoorCommand) -> Result<(), CommandError> {
        self.sent.lock().unwrap().push((*id, command));
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

// ── Credential source ───────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCredentials {
    pub refreshes: AtomicUsize,
    pub reject_login: bool,
    pub reject_refresh: bool,
    /// Tokens expire this long after issue; `None` never expires.
    pub lifetime: Option<Duration>,
    pub issued_at: Mutex<Option<DateTime<Utc>>>,
}

impl FakeCredentials {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn expiring(lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            ..Self::default()
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn access_token(&self) -> Result<SecretString, CoreError> {
        if self.reject_login {
            return Err(CoreError::AuthenticationFailed {
                message: "bad password".into(),
            });
        }
        self.issued_at.lock().unwrap().get_or_insert_with(Utc::now);
        Ok(SecretString::from("tok-1".to_string()))
    }

    async fn refresh(&self) -> Result<SecretString, CoreError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_refresh {
            return Err(CoreError::AuthenticationFailed {
                message: "refresh rejected".into(),
            });
        }
        *self.issued_at.lock().unwrap() = Some(Utc::now());
        Ok(SecretString::from(format!("tok-{}", n + 1)))
    }

    async fn renewal_due(&self) -> Option<DateTime<Utc>> {
        let lifetime = chrono::Duration::from_std(self.lifetime?).unwrap();
        let issued_at = (*self.issued_at.lock().unwrap())?;
        Some(issued_at + lifetime)
    }
}
