//! Shared helpers for command handlers.

use std::sync::Arc;

use doorlink_core::{Door, DoorController, DoorId, DoorKey};

use crate::error::CliError;

/// Resolve a door identifier against the current snapshot.
///
/// Accepts a door id (`533255/1`), a serial key (`F0AD4E03A9AE000/1`, the
/// serial may be given in full), or a door name (case-insensitive).
pub fn resolve_door(controller: &DoorController, identifier: &str) -> Result<Arc<Door>, CliError> {
    if let Ok(id) = identifier.parse::<DoorId>() {
        return controller.door(&id).ok_or_else(|| not_found(identifier));
    }

    if let Some((serial, index)) = identifier.split_once(['/', ':']) {
        if let Ok(index) = index.trim().parse::<u8>() {
            let key = DoorKey::from_serial(serial.trim(), index, controller.config().serial_prefix_len);
            return controller.door_by_key(&key).ok_or_else(|| not_found(identifier));
        }
    }

    let snap = controller.doors_snapshot();
    let matches: Vec<&Arc<Door>> = snap
        .iter()
        .filter(|door| door.name.eq_ignore_ascii_case(identifier))
        .collect();

    match matches.as_slice() {
        [door] => Ok(Arc::clone(door)),
        [] => Err(not_found(identifier)),
        many => Err(CliError::Ambiguous {
            identifier: identifier.into(),
            matches: many
                .iter()
                .map(|door| door.id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn not_found(identifier: &str) -> CliError {
    CliError::NotFound {
        identifier: identifier.into(),
    }
}
