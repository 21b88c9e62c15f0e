// ── Canonical door storage ──

pub(crate) mod table;

pub(crate) use table::{DoorTable, KeyLookup};
