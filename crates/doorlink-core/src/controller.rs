// ── Door controller ──
//
// Full lifecycle management for one door service account: credential
// acquisition, the push connection, periodic snapshots, commands, and
// reactive access to the reconciled door table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use doorlink_api::{CloudClient, MessageHandler, PushConnection, PushMessage, TransportConfig};

use crate::config::ControllerConfig;
use crate::error::{CommandError, CoreError};
use crate::model::{Door, DoorCommand, DoorId, DoorKey, DoorStatus};
use crate::provider::{
    AuthRetry, Backend, CloudCredentials, CloudDoors, RetryingSnapshots, SnapshotProvider,
};
use crate::reconcile::Reconciler;
use crate::registry::{DoorCallback, SubscriptionRegistry};
use crate::stream::{DoorSnapshot, DoorStream};

pub use doorlink_api::ConnectionState;

// ── Push bridge ──────────────────────────────────────────────────

/// Feeds push messages into the reconciler.
struct PushBridge {
    reconciler: Arc<Reconciler>,
}

#[async_trait]
impl MessageHandler for PushBridge {
    async fn on_message(&self, message: PushMessage) -> bool {
        match message {
            PushMessage::Text(text) => self.reconciler.apply_push_event(Some(&text)).await,
            PushMessage::Resync => self.reconciler.apply_push_event(None).await,
        }
    }
}

// ── DoorController ───────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Call
/// [`login()`](Self::login) to authenticate and load the first snapshot,
/// then [`start()`](Self::start) for live updates.
#[derive(Clone)]
pub struct DoorController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    backend: Backend,
    auth: Arc<AuthRetry>,
    snapshots: Arc<RetryingSnapshots>,
    reconciler: Arc<Reconciler>,
    push: PushConnection,
    /// Child token for the current run; replaced on stop so the
    /// controller can be started again.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DoorController {
    /// Create a controller over an arbitrary backend. Does NOT connect.
    pub fn new(config: ControllerConfig, backend: Backend) -> Self {
        let auth = Arc::new(AuthRetry::new(Arc::clone(&backend.credentials)));
        let snapshots = Arc::new(RetryingSnapshots::new(
            Arc::clone(&backend.snapshots),
            Arc::clone(&auth),
        ));
        let registry = Arc::new(SubscriptionRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&snapshots) as Arc<dyn SnapshotProvider>,
            registry,
            config.serial_prefix_len,
        ));
        let push = PushConnection::new(
            config.push_url.clone(),
            SecretString::from(String::new()),
            Arc::new(PushBridge {
                reconciler: Arc::clone(&reconciler),
            }),
            config.reconnect.clone(),
        );

        Self {
            inner: Arc::new(ControllerInner {
                config,
                backend,
                auth,
                snapshots,
                reconciler,
                push,
                cancel_child: Mutex::new(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a controller backed by the cloud REST API.
    pub fn cloud(config: ControllerConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        };
        let client = Arc::new(CloudClient::new(config.api_url.clone(), &transport)?);
        let doors = Arc::new(CloudDoors::new(
            Arc::clone(&client),
            config.serial_prefix_len,
        ));
        let credentials = Arc::new(CloudCredentials::new(
            client,
            config.auth.clone(),
            config.client_id.clone(),
        ));

        let backend = Backend {
            snapshots: Arc::clone(&doors) as Arc<dyn SnapshotProvider>,
            commands: doors,
            credentials,
        };
        Ok(Self::new(config, backend))
    }

    /// Access the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Access the reconciler owning the door table.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.inner.reconciler
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Acquire a credential and load the first snapshot.
    pub async fn login(&self) -> Result<(), CoreError> {
        info!("logging in");
        match self.inner.backend.credentials.access_token().await {
            Ok(_) => {}
            Err(e @ CoreError::AuthenticationFailed { .. }) => return Err(e),
            Err(e) => {
                return Err(CoreError::AuthenticationFailed {
                    message: e.to_string(),
                });
            }
        }

        let doors = self.refresh().await?;
        info!(doors = doors.len(), "logged in");
        Ok(())
    }

    /// Open the push connection and spawn background tasks.
    ///
    /// No-op if already started.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("controller already started");
            return Ok(());
        }

        let cancel = self.inner.cancel_child.lock().await.clone();

        if self.inner.config.push_enabled {
            let token = self.inner.backend.credentials.access_token().await?;
            self.inner.push.set_credential(token).await;
            self.inner.push.start().await;

            handles.push(tokio::spawn(credential_forward_task(
                self.inner.push.clone(),
                self.inner.auth.subscribe_tokens(),
                cancel.clone(),
            )));
        }

        handles.push(tokio::spawn(renewal_task(
            Arc::clone(&self.inner.auth),
            cancel.clone(),
        )));

        if let Some(period) = self.inner.config.refresh_interval() {
            handles.push(tokio::spawn(refresh_task(self.clone(), period, cancel)));
        }

        info!(
            push = self.inner.config.push_enabled,
            refresh_secs = self.inner.config.refresh_interval_secs,
            "controller started"
        );
        Ok(())
    }

    /// Stop background tasks and the push connection.
    pub async fn stop(&self) {
        {
            let mut cancel = self.inner.cancel_child.lock().await;
            cancel.cancel();
            *cancel = CancellationToken::new();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.push.stop().await;
        debug!("controller stopped");
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Fetch a full snapshot and apply it.
    ///
    /// Restarts the push connection when the snapshot shows that push
    /// updates stopped arriving.
    pub async fn refresh(&self) -> Result<DoorSnapshot, CoreError> {
        let doors = self.inner.snapshots.fetch_all_doors().await?;
        let outcome = self.inner.reconciler.apply_snapshot(doors);

        if outcome.restart_required && self.inner.push.is_running() {
            info!("snapshot diverged from push state, restarting push connection");
            self.inner.push.restart().await;
        }

        Ok(outcome.doors)
    }

    // ── Commands ─────────────────────────────────────────────────

    pub async fn open_door(&self, id: &DoorId) -> Result<(), CoreError> {
        self.send_command(id, DoorCommand::Open).await
    }

    pub async fn close_door(&self, id: &DoorId) -> Result<(), CoreError> {
        self.send_command(id, DoorCommand::Close).await
    }

    async fn send_command(&self, id: &DoorId, command: DoorCommand) -> Result<(), CoreError> {
        if self.inner.reconciler.door(id).is_none() {
            return Err(CoreError::DoorNotFound { id: *id });
        }

        info!(%id, %command, "sending door command");
        let commands = &self.inner.backend.commands;
        let result = self
            .inner
            .auth
            .run("command", || commands.send_command(id, command))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(CommandError::AlreadyInState) => {
                info!(%id, %command, "door already in requested state");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Lookups (delegate to Reconciler) ─────────────────────────

    pub fn door(&self, id: &DoorId) -> Option<Arc<Door>> {
        self.inner.reconciler.door(id)
    }

    pub fn door_by_key(&self, key: &DoorKey) -> Option<Arc<Door>> {
        self.inner.reconciler.door_by_key(key)
    }

    pub fn status(&self, id: &DoorId) -> Option<DoorStatus> {
        self.inner.reconciler.status(id)
    }

    pub fn doors_snapshot(&self) -> DoorSnapshot {
        self.inner.reconciler.doors()
    }

    /// Reactive subscription to the door table.
    pub fn doors(&self) -> DoorStream {
        DoorStream::new(self.inner.reconciler.subscribe())
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a change callback for a door, replacing any previous one.
    pub fn register(&self, key: DoorKey, callback: DoorCallback) {
        self.inner.reconciler.registry().register(key, callback);
    }

    pub fn unregister(&self, key: &DoorKey) -> bool {
        self.inner.reconciler.registry().unregister(key)
    }

    // ── State observation ────────────────────────────────────────

    pub fn push_state(&self) -> ConnectionState {
        self.inner.push.state()
    }

    /// Subscribe to push connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.push.subscribe_state()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Wait after a failed renewal before trying again.
const RENEWAL_RETRY: Duration = Duration::from_secs(30);

/// Periodically refresh the door table.
async fn refresh_task(controller: DoorController, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = controller.refresh().await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

/// Renew the credential shortly before it expires.
///
/// New tokens go out through the same channel as rejection-driven
/// refreshes, so the push connection picks them up too. Exits when the
/// credential has no expiry.
async fn renewal_task(auth: Arc<AuthRetry>, cancel: CancellationToken) {
    let mut renewed = false;
    loop {
        let Some(due) = auth.renewal_due().await else {
            debug!("credential does not expire, no renewal scheduled");
            return;
        };
        let mut wait = (due - Utc::now()).to_std().unwrap_or_default();
        // A fresh token already inside the margin must not spin.
        if renewed && wait.is_zero() {
            wait = RENEWAL_RETRY;
        }
        debug!(secs = wait.as_secs(), "credential renewal scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }

        match auth.renew().await {
            Ok(()) => {
                info!("credential renewed ahead of expiry");
                renewed = true;
            }
            Err(e) => {
                warn!(error = %e, "credential renewal failed");
                renewed = false;
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(RENEWAL_RETRY) => {}
                }
            }
        }
    }
}

/// Hand refreshed credentials to the push connection.
///
/// Runs as its own task so a refresh triggered from the push handler
/// never waits on the connection it is running in.
async fn credential_forward_task(
    push: PushConnection,
    mut tokens: watch::Receiver<Option<SecretString>>,
    cancel: CancellationToken,
) {
    tokens.mark_unchanged();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = tokens.changed() => {
                if changed.is_err() {
                    break;
                }
                let token = tokens.borrow_and_update().clone();
                if let Some(token) = token {
                    debug!("forwarding refreshed credential to push connection");
                    push.set_credential(token).await;
                }
            }
        }
    }
}
