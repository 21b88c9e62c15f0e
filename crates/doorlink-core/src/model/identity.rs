// ── Door identity types ──
//
// A door is canonically identified by its device id and door index.
// Push events only carry a (possibly truncated) serial, so doors are also
// addressable by a key built from the leading characters of the serial.
// Both push and snapshot serials go through `DoorKey::from_serial`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of leading serial characters that identify a device.
pub const DEFAULT_SERIAL_PREFIX_LEN: usize = 12;

// ── DoorId ──────────────────────────────────────────────────────────

/// Canonical identity: `(device_id, door_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoorId {
    pub device_id: u64,
    pub door_index: u8,
}

impl DoorId {
    pub fn new(device_id: u64, door_index: u8) -> Self {
        Self {
            device_id,
            door_index,
        }
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.door_index)
    }
}

/// Error returned when a `DoorId` string is not `<device>/<door>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid door id {0:?} (expected <device_id>/<door_index>, e.g. 533255/1)")]
pub struct ParseDoorIdError(String);

impl FromStr for DoorId {
    type Err = ParseDoorIdError;

    /// Accepts `533255/1` or `533255:1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDoorIdError(s.to_owned());
        let (device, door) = s.split_once(['/', ':']).ok_or_else(err)?;
        let device_id = device.trim().parse().map_err(|_| err())?;
        let door_index = door.trim().parse().map_err(|_| err())?;
        Ok(Self::new(device_id, door_index))
    }
}

// ── DoorKey ─────────────────────────────────────────────────────────

/// Alternate identity: `(serial_prefix, door_index)`.
///
/// Used to route push events, which carry a serial of varying length
/// instead of the device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoorKey {
    pub serial_prefix: String,
    pub door_index: u8,
}

impl DoorKey {
    pub fn new(serial_prefix: impl Into<String>, door_index: u8) -> Self {
        Self {
            serial_prefix: serial_prefix.into(),
            door_index,
        }
    }

    /// Build the key for `serial`, keeping its first `prefix_len` characters.
    ///
    /// Serials shorter than `prefix_len` are kept whole.
    pub fn from_serial(serial: &str, door_index: u8, prefix_len: usize) -> Self {
        Self::new(serial_prefix(serial, prefix_len), door_index)
    }
}

impl fmt::Display for DoorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.serial_prefix, self.door_index)
    }
}

/// Leading `len` characters of `serial` (character-, not byte-based).
pub fn serial_prefix(serial: &str, len: usize) -> &str {
    match serial.char_indices().nth(len) {
        Some((idx, _)) => &serial[..idx],
        None => serial,
    }
}
