// ── Backend boundaries ──
//
// The controller talks to the outside world through three object-safe
// traits: snapshots in, commands out, and credentials. The cloud-backed
// implementations wrap a shared `CloudClient`.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use doorlink_api::{CloudClient, CommandKey, TokenSet};

use crate::config::AuthCredentials;
use crate::convert::doors_from_devices;
use crate::error::{CommandError, CoreError, SnapshotError};
use crate::model::{Door, DoorCommand, DoorId};

// ── Traits ──────────────────────────────────────────────────────────

/// Source of full door snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_all_doors(&self) -> Result<Vec<Door>, SnapshotError>;
}

/// Sends open/close commands to a door.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn send_command(&self, id: &DoorId, command: DoorCommand) -> Result<(), CommandError>;
}

/// Supplies bearer tokens.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The current token, acquiring one if none is held yet.
    async fn access_token(&self) -> Result<SecretString, CoreError>;

    /// Obtain a new token after the current one was rejected.
    async fn refresh(&self) -> Result<SecretString, CoreError>;

    /// When the held token should be renewed ahead of its expiry.
    ///
    /// `None` means the token does not expire, or none is held.
    async fn renewal_due(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// The three boundaries a controller needs.
#[derive(Clone)]
pub struct Backend {
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub commands: Arc<dyn CommandChannel>,
    pub credentials: Arc<dyn CredentialSource>,
}

// ── Credential refresh ──────────────────────────────────────────────

/// Total attempts for one operation when the credential is rejected.
const AUTH_ATTEMPTS: u32 = 2;

/// Boundary errors that can mean "credential rejected".
pub(crate) trait AuthRejected {
    fn is_unauthorized(&self) -> bool;
}

impl AuthRejected for SnapshotError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl AuthRejected for CommandError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Runs boundary operations, refreshing the credential and retrying once
/// when it is rejected. Every refreshed token is published on `tokens`.
pub(crate) struct AuthRetry {
    credentials: Arc<dyn CredentialSource>,
    tokens: watch::Sender<Option<SecretString>>,
}

impl AuthRetry {
    pub(crate) fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        let (tokens, _) = watch::channel(None);
        Self {
            credentials,
            tokens,
        }
    }

    /// Receiver for tokens obtained by refreshes.
    pub(crate) fn subscribe_tokens(&self) -> watch::Receiver<Option<SecretString>> {
        self.tokens.subscribe()
    }

    pub(crate) async fn renewal_due(&self) -> Option<DateTime<Utc>> {
        self.credentials.renewal_due().await
    }

    /// Renew the credential ahead of expiry and publish the new token.
    pub(crate) async fn renew(&self) -> Result<(), CoreError> {
        let token = self.credentials.refresh().await?;
        self.tokens.send_replace(Some(token));
        Ok(())
    }

    pub(crate) async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: AuthRejected + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_unauthorized() && attempt < AUTH_ATTEMPTS => {
                    info!(operation, attempt, "credential rejected, refreshing");
                    match self.credentials.refresh().await {
                        Ok(token) => {
                            self.tokens.send_replace(Some(token));
                        }
                        Err(refresh_err) => {
                            warn!(operation, error = %refresh_err, "credential refresh failed");
                            return Err(e);
                        }
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// `SnapshotProvider` wrapper applying [`AuthRetry`].
pub(crate) struct RetryingSnapshots {
    snapshots: Arc<dyn SnapshotProvider>,
    auth: Arc<AuthRetry>,
}

impl RetryingSnapshots {
    pub(crate) fn new(snapshots: Arc<dyn SnapshotProvider>, auth: Arc<AuthRetry>) -> Self {
        Self { snapshots, auth }
    }
}

#[async_trait]
impl SnapshotProvider for RetryingSnapshots {
    async fn fetch_all_doors(&self) -> Result<Vec<Door>, SnapshotError> {
        self.auth
            .run("snapshot", || self.snapshots.fetch_all_doors())
            .await
    }
}

// ── Cloud snapshots & commands ──────────────────────────────────────

/// `SnapshotProvider` + `CommandChannel` over the REST API.
pub struct CloudDoors {
    client: Arc<CloudClient>,
    serial_prefix_len: usize,
}

impl CloudDoors {
    pub fn new(client: Arc<CloudClient>, serial_prefix_len: usize) -> Self {
        Self {
            client,
            serial_prefix_len,
        }
    }
}

#[async_trait]
impl SnapshotProvider for CloudDoors {
    async fn fetch_all_doors(&self) -> Result<Vec<Door>, SnapshotError> {
        let devices = self.client.list_devices().await?;
        let doors = doors_from_devices(devices, self.serial_prefix_len);
        debug!(doors = doors.len(), "snapshot fetched");
        Ok(doors)
    }
}

#[async_trait]
impl CommandChannel for CloudDoors {
    async fn send_command(&self, id: &DoorId, command: DoorCommand) -> Result<(), CommandError> {
        let key = match command {
            DoorCommand::Open => CommandKey::OpenDoor,
            DoorCommand::Close => CommandKey::CloseDoor,
        };
        self.client
            .send_door_command(id.device_id, id.door_index, key)
            .await?;
        Ok(())
    }
}

// ── Cloud credentials ───────────────────────────────────────────────

/// Renew password-grant tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// `CredentialSource` that stores every token it obtains on the client.
pub struct CloudCredentials {
    client: Arc<CloudClient>,
    auth: AuthCredentials,
    client_id: String,
    /// Tokens from the last grant. The lock also serializes renewals.
    tokens: Mutex<Option<TokenSet>>,
}

impl CloudCredentials {
    pub fn new(client: Arc<CloudClient>, auth: AuthCredentials, client_id: String) -> Self {
        Self {
            client,
            auth,
            client_id,
            tokens: Mutex::new(None),
        }
    }

    /// Refresh grant when a refresh token is held, password login otherwise.
    async fn renew(&self, slot: &mut Option<TokenSet>) -> Result<SecretString, CoreError> {
        let AuthCredentials::Password { username, password } = &self.auth else {
            return Err(CoreError::AuthenticationFailed {
                message: "the configured access token was rejected".into(),
            });
        };

        if let Some(refresh_token) = slot.as_ref().and_then(|t| t.refresh_token.clone()) {
            match self
                .client
                .refresh_access_token(&refresh_token, &self.client_id)
                .await
            {
                Ok(mut tokens) => {
                    debug!("access token refreshed");
                    if tokens.refresh_token.is_none() {
                        tokens.refresh_token = Some(refresh_token);
                    }
                    let access = tokens.access_token.clone();
                    *slot = Some(tokens);
                    return Ok(access);
                }
                Err(e) => warn!(error = %e, "refresh grant failed, logging in again"),
            }
        }

        info!(username, "logging in with password grant");
        let tokens = self
            .client
            .login(username, password, &self.client_id)
            .await?;
        let access = tokens.access_token.clone();
        *slot = Some(tokens);
        Ok(access)
    }
}

#[async_trait]
impl CredentialSource for CloudCredentials {
    async fn access_token(&self) -> Result<SecretString, CoreError> {
        let mut slot = self.tokens.lock().await;

        if let Some(tokens) = slot.as_ref() {
            if !tokens.needs_refresh_at(Utc::now(), EXPIRY_MARGIN) {
                return Ok(tokens.access_token.clone());
            }
            debug!("access token close to expiry, renewing");
            return self.renew(&mut slot).await;
        }

        match &self.auth {
            AuthCredentials::Token(token) => {
                self.client.set_token(token.clone());
                *slot = Some(TokenSet::from_access_token(token.clone()));
                Ok(token.clone())
            }
            AuthCredentials::Password { .. } => self.renew(&mut slot).await,
        }
    }

    async fn refresh(&self) -> Result<SecretString, CoreError> {
        let mut slot = self.tokens.lock().await;
        self.renew(&mut slot).await
    }

    async fn renewal_due(&self) -> Option<DateTime<Utc>> {
        let expires_at = self.tokens.lock().await.as_ref()?.expires_at()?;
        let margin = chrono::Duration::from_std(EXPIRY_MARGIN).ok()?;
        expires_at.checked_sub_signed(margin)
    }
}
