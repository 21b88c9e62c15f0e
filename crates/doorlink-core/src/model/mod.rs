// ── Domain model ──

pub mod door;
pub mod identity;

pub use door::{Door, DoorCommand, DoorFault, DoorStatus, LinkStatus};
pub use identity::{DEFAULT_SERIAL_PREFIX_LEN, DoorId, DoorKey, ParseDoorIdError, serial_prefix};
