// ── Door domain types ──

use serde::Serialize;
use strum::Display;

use super::identity::{DoorId, DoorKey};

/// Canonical door position.
///
/// Decoded from the service's integer codes by [`DoorStatus::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DoorStatus {
    Unknown,
    Open,
    Opening,
    /// Opening timed out; the door is assumed still closed.
    TimeoutOpeningAsClosed,
    Closed,
    Closing,
    /// Closing timed out; the door is assumed still open.
    TimeoutClosingAsOpen,
}

impl DoorStatus {
    /// Decode a wire status code. `7` means "not configured" and, like
    /// every code outside the table, maps to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Open,
            2 => Self::Opening,
            3 => Self::TimeoutOpeningAsClosed,
            4 => Self::Closed,
            5 => Self::Closing,
            6 => Self::TimeoutClosingAsOpen,
            _ => Self::Unknown,
        }
    }

    pub fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }
}

/// Pairing state between the controller and the door sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Unknown,
    NotConfigured,
    Paired,
    Connected,
}

impl LinkStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::NotConfigured,
            2 => Self::Paired,
            3 => Self::Connected,
            _ => Self::Unknown,
        }
    }
}

/// Safety fault reported for a door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DoorFault {
    None,
    UlLockout,
    Interlock,
    NotSafe,
    WillNotMove,
    Unknown,
}

impl DoorFault {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::UlLockout,
            2 => Self::Interlock,
            3 => Self::NotSafe,
            4 => Self::WillNotMove,
            _ => Self::Unknown,
        }
    }
}

/// Commands accepted by the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DoorCommand {
    Open,
    Close,
}

impl DoorCommand {
    /// Status the door reaches once the command completes.
    pub fn target_status(self) -> DoorStatus {
        match self {
            Self::Open => DoorStatus::Open,
            Self::Close => DoorStatus::Closed,
        }
    }
}

/// One door as held in the canonical table.
///
/// `status` is the only field push events touch; everything else is
/// replaced wholesale by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Door {
    pub id: DoorId,
    pub key: DoorKey,
    pub status: DoorStatus,
    pub link_status: LinkStatus,
    pub battery_level: i64,
    /// WiFi signal strength of the parent device, in dBm.
    pub rssi: i32,
    pub ble_strength: i64,
    pub fault: DoorFault,
    /// Device-level connectivity at the time of the snapshot.
    pub device_online: bool,
    pub name: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    /// Full device serial as reported by the snapshot.
    pub serial: String,
}
