//! Push notification channel with lifecycle management.
//!
//! Owns a single WebSocket to the service's event endpoint and delivers
//! each text frame, in arrival order, to a [`MessageHandler`]. The
//! connection loop runs as one background task and recovers from drops
//! on its own: failed cycles spend a small retry budget on immediate
//! reconnects, and once the budget is gone every further attempt waits a
//! fixed long delay. The budget is refilled only once a connection has
//! completed a receive cycle (a text frame applied, or a ping or pong
//! received); a handshake alone does not count.
//!
//! # Example
//!
//! ```rust,ignore
//! use doorlink_api::websocket::{PushConnection, ReconnectConfig};
//!
//! let push = PushConnection::new(url, token, Arc::new(my_handler), ReconnectConfig::default());
//! push.start().await;
//! // ...
//! push.stop().await; // returns once the background task has exited
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;

// ── Handler boundary ─────────────────────────────────────────────────

/// What the connection manager hands to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// One UTF-8 text frame, exactly as received.
    Text(String),
    /// Synthetic directive: the stream is no longer trustworthy and the
    /// consumer should rebuild its state from a fresh snapshot.
    Resync,
}

/// Consumer of push messages.
///
/// The return value means "understood and applied". Returning `false`
/// for a text frame makes the connection manager deliver
/// [`PushMessage::Resync`] and then reopen the connection.
///
/// Handlers run on the connection task: a slow handler delays every
/// subsequent frame, and a handler must never call
/// [`PushConnection::stop`] on the connection that invoked it.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, message: PushMessage) -> bool;
}

// ── ConnectionState ──────────────────────────────────────────────────

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Starting,
    Connected,
    /// Waiting for or performing reconnect attempt number `attempt`
    /// since the last successful handshake.
    Reconnecting { attempt: u32 },
    Stopping,
}

impl ConnectionState {
    /// `true` while a connection loop is alive.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Connected | Self::Reconnecting { .. }
        )
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Reconnect and heartbeat tuning.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Immediate reconnects allowed before falling back to `long_delay`. Default: 3.
    pub attempts: u32,

    /// Delay between attempts once the budget is spent. Default: 60s.
    pub long_delay: Duration,

    /// Client ping interval while connected. `None` disables heartbeats.
    /// Default: 20s.
    pub heartbeat: Option<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            long_delay: Duration::from_secs(60),
            heartbeat: Some(Duration::from_secs(20)),
        }
    }
}

// ── RetryBudget ──────────────────────────────────────────────────────

/// Attempt counter driving the reconnect policy.
///
/// Counts down from `attempts` on every failed cycle. While it stays above
/// zero the next attempt is immediate; at zero it is held there and every
/// attempt waits `long_delay`. [`restore`](Self::restore) refills it.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    ceiling: u32,
    remaining: u32,
    failures: u32,
    long_delay: Duration,
}

impl RetryBudget {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            ceiling: config.attempts,
            remaining: config.attempts,
            failures: 0,
            long_delay: config.long_delay,
        }
    }

    /// Record a failed cycle. Returns the delay to wait before the next
    /// attempt, or `None` to reconnect immediately.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.saturating_sub(1);
        self.failures = self.failures.saturating_add(1);
        if self.remaining > 0 {
            None
        } else {
            Some(self.long_delay)
        }
    }

    /// Refill the budget after a completed receive cycle.
    pub fn restore(&mut self) {
        self.remaining = self.ceiling;
        self.failures = 0;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Consecutive failures since the last [`restore`](Self::restore).
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ── PushConnection ───────────────────────────────────────────────────

/// Handle to the push connection manager.
///
/// Cheaply cloneable; all clones drive the same connection.
#[derive(Clone)]
pub struct PushConnection {
    inner: Arc<PushInner>,
}

struct PushInner {
    url: Url,
    credential: ArcSwap<SecretString>,
    handler: Arc<dyn MessageHandler>,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    /// The running loop, if any. Held across `start`/`stop` so lifecycle
    /// transitions never interleave.
    lifecycle: Mutex<Option<RunningLoop>>,
    credential_lock: Mutex<()>,
}

struct RunningLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PushConnection {
    /// Create a stopped connection manager. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(
        url: Url,
        credential: SecretString,
        handler: Arc<dyn MessageHandler>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Stopped);
        Self {
            inner: Arc::new(PushInner {
                url,
                credential: ArcSwap::from_pointee(credential),
                handler,
                reconnect,
                state,
                lifecycle: Mutex::new(None),
                credential_lock: Mutex::new(()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// `true` while a connection loop is alive.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Launch the connection loop. No-op if it is already running.
    pub async fn start(&self) {
        let mut running = self.inner.lifecycle.lock().await;

        if let Some(ref existing) = *running {
            if !existing.task.is_finished() {
                debug!(state = ?self.state(), "push connection already running");
                return;
            }
        }

        self.inner.state.send_replace(ConnectionState::Starting);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(connection_loop(Arc::clone(&self.inner), cancel.clone()));
        *running = Some(RunningLoop { cancel, task });
        info!(url = %self.inner.url, "push connection starting");
    }

    /// Close the live connection and wait for the loop to exit.
    ///
    /// No timeout is applied: the close handshake is allowed to finish.
    /// No-op if not running.
    pub async fn stop(&self) {
        let mut running = self.inner.lifecycle.lock().await;

        let Some(RunningLoop { cancel, task }) = running.take() else {
            debug!("push connection not running");
            return;
        };

        self.inner.state.send_replace(ConnectionState::Stopping);
        cancel.cancel();

        if let Err(e) = task.await {
            warn!(error = %e, "push connection task ended abnormally");
        }

        self.inner.state.send_replace(ConnectionState::Stopped);
        info!("push connection stopped");
    }

    /// Stop, then start again with a fresh retry budget.
    pub async fn restart(&self) {
        info!("restarting push connection");
        self.stop().await;
        self.start().await;
    }

    /// Swap the credential used for the next connection attempt.
    ///
    /// If currently connected, the connection is restarted so the new
    /// credential takes effect immediately.
    pub async fn set_credential(&self, credential: SecretString) {
        let _guard = self.inner.credential_lock.lock().await;
        self.inner.credential.store(Arc::new(credential));
        debug!("push credential updated");

        if self.state() == ConnectionState::Connected {
            self.restart().await;
        }
    }
}

// ── Background connection loop ───────────────────────────────────────

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Closed,
    Desynchronized,
}

/// Main loop: connect → read → on exit, spend budget → reconnect.
async fn connection_loop(inner: Arc<PushInner>, cancel: CancellationToken) {
    let mut budget = RetryBudget::new(&inner.reconnect);

    loop {
        match connect_and_read(&inner, &cancel, &mut budget).await {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::Closed) => info!("push connection closed"),
            Ok(SessionEnd::Desynchronized) => info!("push stream desynchronized, reconnecting"),
            Err(e) => warn!(error = %e, attempt = budget.failures(), "push connection error"),
        }

        if cancel.is_cancelled() {
            break;
        }

        let delay = budget.on_failure();
        inner.state.send_replace(ConnectionState::Reconnecting {
            attempt: budget.failures(),
        });

        if let Some(delay) = delay {
            info!(
                delay_secs = delay.as_secs(),
                attempt = budget.failures(),
                "retry budget exhausted, waiting before reconnect"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    debug!("push connection loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket connection and pump frames until it ends.
async fn connect_and_read(
    inner: &PushInner,
    cancel: &CancellationToken,
    budget: &mut RetryBudget,
) -> Result<SessionEnd, Error> {
    info!(url = %inner.url, "connecting push channel");

    let uri: tungstenite::http::Uri = inner
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let credential = inner.credential.load_full();
    let request = ClientRequestBuilder::new(uri).with_header(
        "Authorization",
        format!("Bearer {}", credential.expose_secret()),
    );

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        result = tokio_tungstenite::connect_async(request) => {
            result.map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };

    inner.state.send_replace(ConnectionState::Connected);
    info!("push channel connected");

    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = inner.reconnect.heartbeat.map(heartbeat_interval);
    let mut cycle_complete = false;
    let mut complete_cycle = |budget: &mut RetryBudget| {
        if !cycle_complete {
            cycle_complete = true;
            budget.restore();
            trace!("push receive cycle completed, retry budget restored");
        }
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = write.close().await {
                    debug!(error = %e, "close handshake failed");
                }
                return Ok(SessionEnd::Cancelled);
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "push frame received");
                        let applied = inner
                            .handler
                            .on_message(PushMessage::Text(text.as_str().to_owned()))
                            .await;
                        if !applied {
                            info!("handler rejected push frame, requesting resync");
                            inner.handler.on_message(PushMessage::Resync).await;
                            if let Err(e) = write.close().await {
                                debug!(error = %e, "close handshake failed");
                            }
                            return Ok(SessionEnd::Desynchronized);
                        }
                        complete_cycle(budget);
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong; flushed on the next write or read
                        trace!("push ping");
                        complete_cycle(budget);
                    }
                    Some(Ok(Message::Pong(_))) => {
                        trace!("push pong");
                        complete_cycle(budget);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let Some(cf) = frame else {
                            info!("push close frame received (no payload)");
                            return Ok(SessionEnd::Closed);
                        };
                        info!(code = %cf.code, reason = %cf.reason, "push close frame received");
                        return match cf.code {
                            CloseCode::Normal | CloseCode::Away => Ok(SessionEnd::Closed),
                            code => Err(Error::WebSocketClosed {
                                code: u16::from(code),
                                reason: cf.reason.to_string(),
                            }),
                        };
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        info!("push stream ended");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => {
                        // Binary, raw Frame -- ignore
                    }
                }
            }
            () = next_heartbeat(&mut heartbeat) => {
                trace!("push heartbeat ping");
                write
                    .send(Message::Ping(Bytes::new()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
        }
    }
}

fn heartbeat_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Resolves on the next heartbeat tick, or never when heartbeats are off.
async fn next_heartbeat(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.attempts, 3);
        assert_eq!(config.long_delay, Duration::from_secs(60));
        assert_eq!(config.heartbeat, Some(Duration::from_secs(20)));
    }

    #[test]
    fn fourth_attempt_waits_for_long_delay() {
        let mut budget = RetryBudget::new(&ReconnectConfig::default());

        assert_eq!(budget.on_failure(), None);
        assert_eq!(budget.on_failure(), None);
        assert_eq!(budget.on_failure(), Some(Duration::from_secs(60)));
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn exhausted_budget_holds_at_zero() {
        let mut budget = RetryBudget::new(&ReconnectConfig::default());
        for _ in 0..3 {
            budget.on_failure();
        }

        for _ in 0..5 {
            assert_eq!(budget.on_failure(), Some(Duration::from_secs(60)));
            assert_eq!(budget.remaining(), 0);
        }
        assert_eq!(budget.failures(), 8);
    }

    #[test]
    fn restore_refills_budget() {
        let mut budget = RetryBudget::new(&ReconnectConfig::default());
        for _ in 0..4 {
            budget.on_failure();
        }

        budget.restore();
        assert_eq!(budget.remaining(), 3);
        assert_eq!(budget.failures(), 0);
        assert_eq!(budget.on_failure(), None);
    }

    #[test]
    fn zero_attempt_budget_always_waits() {
        let config = ReconnectConfig {
            attempts: 0,
            long_delay: Duration::from_secs(5),
            heartbeat: None,
        };
        let mut budget = RetryBudget::new(&config);
        assert_eq!(budget.on_failure(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn running_states() {
        assert!(ConnectionState::Starting.is_running());
        assert!(ConnectionState::Connected.is_running());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_running());
        assert!(!ConnectionState::Stopped.is_running());
        assert!(!ConnectionState::Stopping.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_heartbeat_never_fires() {
        let mut none: Option<Interval> = None;
        let fired = tokio::time::timeout(Duration::from_secs(3600), next_heartbeat(&mut none)).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_after_one_period() {
        let mut hb = Some(heartbeat_interval(Duration::from_secs(20)));
        let start = Instant::now();
        next_heartbeat(&mut hb).await;
        assert!(start.elapsed() >= Duration::from_secs(20));
    }
}
