// ── API-to-domain type conversions ──
//
// Bridges raw `doorlink_api` device records into canonical `Door` values
// and decodes push frames into typed events. Integer fields in push frames
// are accepted as JSON numbers or numeric strings.

use serde_json::Value;

use doorlink_api::{DeviceRecord, DoorRecord};

use crate::model::{Door, DoorFault, DoorId, DoorKey, DoorStatus, LinkStatus};

// ── Snapshot records ────────────────────────────────────────────────

/// Device-level status code meaning "connected".
const DEVICE_ONLINE: i64 = 1;

fn door_from_record(device: &DeviceRecord, door: DoorRecord, prefix_len: usize) -> Door {
    Door {
        id: DoorId::new(device.id, door.door_index),
        key: DoorKey::from_serial(&device.serial, door.door_index, prefix_len),
        status: DoorStatus::from_code(door.status),
        link_status: LinkStatus::from_code(door.link_status),
        battery_level: door.battery_level,
        rssi: device.rssi,
        ble_strength: door.ble_strength,
        fault: DoorFault::from_code(door.fault),
        device_online: device.status == DEVICE_ONLINE,
        name: door.name,
        vendor: device.vendor.clone(),
        model: device.model.clone(),
        serial: device.serial.clone(),
    }
}

/// Flatten one device record into its doors.
pub fn doors_from_device(mut device: DeviceRecord, prefix_len: usize) -> Vec<Door> {
    let doors = std::mem::take(&mut device.doors);
    doors
        .into_iter()
        .map(|door| door_from_record(&device, door, prefix_len))
        .collect()
}

/// Flatten a full device listing into the door list of a snapshot.
pub fn doors_from_devices(devices: Vec<DeviceRecord>, prefix_len: usize) -> Vec<Door> {
    devices
        .into_iter()
        .flat_map(|device| doors_from_device(device, prefix_len))
        .collect()
}

// ── Push frames ─────────────────────────────────────────────────────

/// One fact carried by a push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// `{serial, device_status}`: device connectivity changed.
    DeviceStatus { serial: String, status: i64 },
    /// `{serial, door, door_status}`: one door moved.
    DoorStatus {
        serial: String,
        door: u8,
        status: DoorStatus,
    },
}

/// Accept `1` and `"1"` alike.
fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode a push text frame into the events it carries, device-level
/// first.
///
/// A frame may carry both shapes at once. Only malformed JSON is an
/// error; well-formed frames without the expected fields decode to no
/// events.
pub fn parse_push_frame(raw: &str) -> Result<Vec<PushEvent>, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let mut events = Vec::new();
    let Some(obj) = value.as_object() else {
        return Ok(events);
    };
    let Some(serial) = obj.get("serial").and_then(Value::as_str) else {
        return Ok(events);
    };

    if let Some(status) = obj.get("device_status").and_then(lenient_int) {
        events.push(PushEvent::DeviceStatus {
            serial: serial.to_owned(),
            status,
        });
    }

    let door = obj
        .get("door")
        .and_then(lenient_int)
        .and_then(|d| u8::try_from(d).ok());
    let status = obj.get("door_status").and_then(lenient_int);

    if let (Some(door), Some(code)) = (door, status) {
        events.push(PushEvent::DoorStatus {
            serial: serial.to_owned(),
            door,
            status: DoorStatus::from_code(code),
        });
    }

    Ok(events)
}
