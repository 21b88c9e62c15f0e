//! Reactive door state between `doorlink-api` and consumers (CLI, home
//! automation bridges).
//!
//! - **[`DoorController`]**: central facade. [`login()`](DoorController::login)
//!   acquires a credential and loads the first snapshot;
//!   [`start()`](DoorController::start) opens the push connection and the
//!   periodic refresh task.
//!
//! - **[`Reconciler`]**: owns the canonical door table (`DashMap` +
//!   `tokio::sync::watch`), merging snapshots and push events, dropping
//!   duplicates, and deciding when the push connection must restart.
//!
//! - **[`SubscriptionRegistry`]**: per-door change callbacks keyed by
//!   [`DoorKey`].
//!
//! - **Boundaries** ([`provider`]): [`SnapshotProvider`], [`CommandChannel`]
//!   and [`CredentialSource`] traits with cloud-backed implementations.

pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub(crate) mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AuthCredentials, ControllerConfig};
pub use controller::{ConnectionState, DoorController};
pub use error::{CommandError, CoreError, SnapshotError};
pub use model::{
    DEFAULT_SERIAL_PREFIX_LEN, Door, DoorCommand, DoorFault, DoorId, DoorKey, DoorStatus,
    LinkStatus,
};
pub use provider::{Backend, CommandChannel, CredentialSource, SnapshotProvider};
pub use reconcile::{Reconciler, SnapshotOutcome};
pub use registry::{DoorCallback, SubscriptionRegistry};
pub use stream::{DoorSnapshot, DoorStream};
