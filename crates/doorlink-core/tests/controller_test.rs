#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use url::Url;

use common::{FakeCommands, FakeCredentials, FakeSnapshots, counter, door, hits};
use doorlink_core::{
    AuthCredentials, Backend, CommandError, ConnectionState, ControllerConfig, CoreError,
    DoorCommand, DoorController, DoorId, DoorKey, DoorStatus, SnapshotError,
};

const SERIAL: &str = "F0AD4E03A9AE000";

fn config() -> ControllerConfig {
    let mut config = ControllerConfig::new(
        Url::parse("https://api.example.net/v1").unwrap(),
        Url::parse("wss://events.example.net/updates").unwrap(),
        AuthCredentials::Token(SecretString::from("tok-1".to_string())),
    );
    config.push_enabled = false;
    config.refresh_interval_secs = 0;
    config
}

struct Harness {
    controller: DoorController,
    snapshots: Arc<FakeSnapshots>,
    commands: Arc<FakeCommands>,
    credentials: Arc<FakeCredentials>,
}

fn harness_with(config: ControllerConfig, credentials: FakeCredentials) -> Harness {
    let snapshots = FakeSnapshots::new(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    let commands = FakeCommands::new();
    let credentials = Arc::new(credentials);
    let backend = Backend {
        snapshots: Arc::clone(&snapshots) as _,
        commands: Arc::clone(&commands) as _,
        credentials: Arc::clone(&credentials) as _,
    };
    Harness {
        controller: DoorController::new(config, backend),
        snapshots,
        commands,
        credentials,
    }
}

fn harness() -> Harness {
    harness_with(config(), FakeCredentials::default())
}

fn garage() -> DoorId {
    DoorId::new(533_255, 1)
}

const WAIT: Duration = Duration::from_secs(5);

/// Accepted push connection with the authorization header it presented.
struct PushConn {
    authorization: Option<String>,
    _ws: WebSocketStream<TcpStream>,
}

/// Local push endpoint handing every accepted connection to the test.
async fn push_server() -> (Url, mpsc::UnboundedReceiver<PushConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, conns) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut authorization = None;
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    authorization = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    Ok(resp)
                };
                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                    let _ = tx.send(PushConn {
                        authorization,
                        _ws: ws,
                    });
                }
            });
        }
    });

    (Url::parse(&format!("ws://{addr}/updates")).unwrap(), conns)
}

async fn next_push_conn(conns: &mut mpsc::UnboundedReceiver<PushConn>) -> PushConn {
    tokio::time::timeout(WAIT, conns.recv())
        .await
        .expect("no push connection within timeout")
        .unwrap()
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_loads_first_snapshot() {
    let h = harness();
    h.controller.login().await.unwrap();

    assert_eq!(h.snapshots.calls(), 1);
    assert_eq!(h.controller.status(&garage()), Some(DoorStatus::Closed));
    assert_eq!(h.controller.doors_snapshot().len(), 1);
    assert!(
        h.controller
            .door_by_key(&DoorKey::new("F0AD4E03A9AE", 1))
            .is_some()
    );
}

#[tokio::test]
async fn login_rejection_is_authentication_failure() {
    let h = harness_with(
        config(),
        FakeCredentials {
            reject_login: true,
            ..FakeCredentials::default()
        },
    );

    let err = h.controller.login().await.unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(h.snapshots.calls(), 0);
}

// ── Credential refresh ──────────────────────────────────────────────

#[tokio::test]
async fn rejected_snapshot_refreshes_and_retries_once() {
    let h = harness();
    h.snapshots.fail_with([SnapshotError::Unauthorized]);

    h.controller.login().await.unwrap();

    assert_eq!(h.snapshots.calls(), 2);
    assert_eq!(h.credentials.refreshes(), 1);
    assert_eq!(h.controller.status(&garage()), Some(DoorStatus::Closed));
}

#[tokio::test]
async fn persistent_rejection_stops_after_two_attempts() {
    let h = harness();
    h.snapshots.fail_with([
        SnapshotError::Unauthorized,
        SnapshotError::Unauthorized,
        SnapshotError::Unauthorized,
    ]);

    let err = h.controller.refresh().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(h.snapshots.calls(), 2);
    assert_eq!(h.credentials.refreshes(), 1);
}

#[tokio::test]
async fn failed_refresh_surfaces_original_rejection() {
    let h = harness_with(
        config(),
        FakeCredentials {
            reject_refresh: true,
            ..FakeCredentials::default()
        },
    );
    h.snapshots.fail_with([SnapshotError::Unauthorized]);

    let err = h.controller.refresh().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(h.snapshots.calls(), 1);
    assert_eq!(h.credentials.refreshes(), 1);
}

#[tokio::test]
async fn transient_snapshot_error_is_not_retried() {
    let h = harness();
    h.snapshots
        .fail_with([SnapshotError::Transient("503 Service Unavailable".into())]);

    let err = h.controller.refresh().await.unwrap_err();

    assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    assert_eq!(h.snapshots.calls(), 1);
    assert_eq!(h.credentials.refreshes(), 0);
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn open_and_close_reach_command_channel() {
    let h = harness();
    h.controller.login().await.unwrap();

    h.controller.open_door(&garage()).await.unwrap();
    h.controller.close_door(&garage()).await.unwrap();

    assert_eq!(
        h.commands.sent(),
        vec![(garage(), DoorCommand::Open), (garage(), DoorCommand::Close)]
    );
}

#[tokio::test]
async fn already_in_state_is_success() {
    let h = harness();
    h.controller.login().await.unwrap();
    h.commands.fail_with([CommandError::AlreadyInState]);

    h.controller.close_door(&garage()).await.unwrap();
    assert_eq!(h.commands.sent().len(), 1);
}

#[tokio::test]
async fn unknown_door_is_rejected_before_sending() {
    let h = harness();
    h.controller.login().await.unwrap();

    let err = h
        .controller
        .open_door(&DoorId::new(1, 9))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DoorNotFound { id } if id == DoorId::new(1, 9)));
    assert!(h.commands.sent().is_empty());
}

#[tokio::test]
async fn rejected_command_refreshes_and_retries() {
    let h = harness();
    h.controller.login().await.unwrap();
    h.commands.fail_with([CommandError::Unauthorized]);

    h.controller.open_door(&garage()).await.unwrap();

    assert_eq!(h.commands.sent().len(), 2);
    assert_eq!(h.credentials.refreshes(), 1);
}

#[tokio::test]
async fn fatal_command_error_surfaces() {
    let h = harness();
    h.controller.login().await.unwrap();
    h.commands
        .fail_with([CommandError::Fatal("door is locked out".into())]);

    let err = h.controller.open_door(&garage()).await.unwrap_err();
    assert!(matches!(err, CoreError::Command(CommandError::Fatal(_))));
    assert_eq!(h.credentials.refreshes(), 0);
}

// ── Subscriptions & streams ─────────────────────────────────────────

#[tokio::test]
async fn refresh_notifies_registered_callback() {
    let h = harness();
    h.controller.login().await.unwrap();

    let key = DoorKey::new("F0AD4E03A9AE", 1);
    let (count, callback) = counter();
    h.controller.register(key.clone(), callback);

    h.snapshots
        .set_doors(vec![door(533_255, 1, SERIAL, DoorStatus::Opening)]);
    h.controller.refresh().await.unwrap();
    assert_eq!(hits(&count), 1);

    assert!(h.controller.unregister(&key));
    assert!(!h.controller.unregister(&key));
}

#[tokio::test]
async fn door_stream_yields_updates() {
    let h = harness();
    h.controller.login().await.unwrap();

    let stream = h.controller.doors();
    assert_eq!(stream.current().len(), 1);
    let mut updates = stream.into_stream();

    h.snapshots.set_doors(vec![
        door(533_255, 1, SERIAL, DoorStatus::Open),
        door(533_255, 2, SERIAL, DoorStatus::Closed),
    ]);
    h.controller.refresh().await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(1), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.len(), 2);
    assert_eq!(next[0].status, DoorStatus::Open);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn periodic_refresh_runs_until_stopped() {
    let mut cfg = config();
    cfg.refresh_interval_secs = 10;
    let h = harness_with(cfg, FakeCredentials::default());

    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();
    // Second start is a no-op.
    h.controller.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.snapshots.calls(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.snapshots.calls(), 3);

    h.controller.stop().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.snapshots.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn expiring_credential_is_renewed_until_stopped() {
    let h = harness_with(config(), FakeCredentials::expiring(Duration::from_secs(100)));

    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();
    assert_eq!(h.credentials.refreshes(), 0);

    tokio::time::sleep(Duration::from_secs(101)).await;
    assert_eq!(h.credentials.refreshes(), 1);

    // The renewed token gets its own deadline.
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(h.credentials.refreshes(), 2);

    h.controller.stop().await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.credentials.refreshes(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_expiring_credential_is_never_renewed() {
    let h = harness();
    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(86_400)).await;
    assert_eq!(h.credentials.refreshes(), 0);

    h.controller.stop().await;
}

#[tokio::test]
async fn divergent_snapshot_restarts_running_push_connection() {
    let (push_url, mut conns) = push_server().await;
    let mut cfg = config();
    cfg.push_enabled = true;
    cfg.push_url = push_url;
    cfg.reconnect.heartbeat = None;
    let h = harness_with(cfg, FakeCredentials::default());

    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();
    let first = next_push_conn(&mut conns).await;
    assert_eq!(first.authorization.as_deref(), Some("Bearer tok-1"));

    // Agreeing snapshot: the connection stays as it is.
    h.controller.refresh().await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(300), conns.recv())
            .await
            .is_err(),
        "push connection restarted without divergence"
    );

    // The anchor door moved without a push update: reconnect.
    h.snapshots
        .set_doors(vec![door(533_255, 1, SERIAL, DoorStatus::Open)]);
    h.controller.refresh().await.unwrap();
    let second = next_push_conn(&mut conns).await;
    assert_eq!(second.authorization.as_deref(), Some("Bearer tok-1"));
    assert!(h.controller.push_state().is_running());

    h.controller.stop().await;
}

#[tokio::test]
async fn push_disabled_leaves_connection_stopped() {
    let h = harness();
    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();

    assert_eq!(h.controller.push_state(), ConnectionState::Stopped);

    // A divergent snapshot cannot restart a push connection that is not running.
    h.snapshots
        .set_doors(vec![door(533_255, 1, SERIAL, DoorStatus::Open)]);
    h.controller.refresh().await.unwrap();
    assert_eq!(h.controller.push_state(), ConnectionState::Stopped);

    h.controller.stop().await;
}

#[tokio::test]
async fn stop_halts_push_connection() {
    let mut cfg = config();
    cfg.push_enabled = true;
    cfg.push_url = Url::parse("ws://127.0.0.1:9/updates").unwrap();
    cfg.reconnect.long_delay = Duration::from_secs(600);
    let h = harness_with(cfg, FakeCredentials::default());

    h.controller.login().await.unwrap();
    h.controller.start().await.unwrap();
    assert!(h.controller.push_state().is_running());

    h.controller.stop().await;
    assert_eq!(h.controller.push_state(), ConnectionState::Stopped);
}
