// Wire models for the device REST API.
//
// Optional integer fields default to 0 the way the service omits them.
// Required fields are the ones reconciliation cannot work without:
// the device id, the serial, and the door index.

use serde::{Deserialize, Serialize};

/// Response of `GET /devices`.
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

/// One door controller as reported by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawDeviceRecord")]
pub struct DeviceRecord {
    pub id: u64,

    /// Full serial number. Older API revisions name this `serial_number`.
    pub serial: String,

    pub name: Option<String>,

    pub vendor: Option<String>,

    pub model: Option<String>,

    /// WiFi signal strength of the controller, in dBm.
    pub rssi: i32,

    /// Device connectivity: 0 offline, 1 connected.
    pub status: i64,

    pub doors: Vec<DoorRecord>,
}

/// Wire shape of [`DeviceRecord`]. Some payloads carry both serial
/// spellings, so they are read separately and `serial` wins.
#[derive(Deserialize)]
struct RawDeviceRecord {
    id: u64,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    rssi: i32,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    doors: Vec<DoorRecord>,
}

impl TryFrom<RawDeviceRecord> for DeviceRecord {
    type Error = String;

    fn try_from(raw: RawDeviceRecord) -> Result<Self, Self::Error> {
        let serial = raw
            .serial
            .or(raw.serial_number)
            .ok_or_else(|| "missing field `serial`".to_owned())?;
        Ok(Self {
            id: raw.id,
            serial,
            name: raw.name,
            vendor: raw.vendor,
            model: raw.model,
            rssi: raw.rssi,
            status: raw.status,
            doors: raw.doors,
        })
    }
}

/// One door attached to a controller.
#[derive(Debug, Clone, Deserialize)]
pub struct DoorRecord {
    pub door_index: u8,

    #[serde(default)]
    pub name: String,

    /// Raw door status code (see the core crate for the decoding table).
    #[serde(default)]
    pub status: i64,

    #[serde(default)]
    pub link_status: i64,

    #[serde(default)]
    pub battery_level: i64,

    #[serde(default)]
    pub ble_strength: i64,

    #[serde(default)]
    pub fault: i64,
}

/// Command keys accepted by the door command endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandKey {
    #[serde(rename = "OpenDoor")]
    OpenDoor,
    #[serde(rename = "CloseDoor")]
    CloseDoor,
}

/// Body of `POST /devices/{id}/door/{index}/command`.
#[derive(Debug, Serialize)]
pub(crate) struct CommandRequest {
    pub command_key: CommandKey,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
