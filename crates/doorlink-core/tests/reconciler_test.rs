#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{FakeSnapshots, counter, door, hits};
use doorlink_core::{
    DoorId, DoorKey, DoorStatus, Reconciler, SnapshotError, SnapshotProvider,
    SubscriptionRegistry,
};

const SERIAL: &str = "F0AD4E03A9AE000";
const OTHER_SERIAL: &str = "0011223344550000";

fn reconciler(snapshots: &Arc<FakeSnapshots>) -> Reconciler {
    Reconciler::new(
        Arc::clone(snapshots) as Arc<dyn SnapshotProvider>,
        Arc::new(SubscriptionRegistry::new()),
        12,
    )
}

fn garage_id() -> DoorId {
    DoorId::new(533_255, 1)
}

fn garage_key() -> DoorKey {
    DoorKey::new("F0AD4E03A9AE", 1)
}

// ── Push events ─────────────────────────────────────────────────────

#[tokio::test]
async fn door_status_push_updates_table_and_notifies_once() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    let (count, callback) = counter();
    rec.registry().register(garage_key(), callback);

    let frame = r#"{"serial":"F0AD4E03A9AE0","door":1,"door_status":1}"#;
    assert!(rec.apply_push_event(Some(frame)).await);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Open));
    assert_eq!(hits(&count), 1);

    // Redelivery of the same status is a no-op.
    let version = rec.version();
    assert!(rec.apply_push_event(Some(frame)).await);
    assert_eq!(hits(&count), 1);
    assert_eq!(rec.version(), version);
}

#[tokio::test]
async fn string_encoded_integers_are_accepted() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    let frame = r#"{"serial":"F0AD4E03A9AE000","door":"1","door_status":"2"}"#;
    assert!(rec.apply_push_event(Some(frame)).await);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Opening));
}

#[tokio::test]
async fn offline_device_requests_restart_without_mutation() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    let version = rec.version();

    assert!(
        !rec.apply_push_event(Some(r#"{"serial":"F0AD4E03A9AE000","device_status":0}"#))
            .await
    );
    assert!(
        !rec.apply_push_event(Some(r#"{"serial":"F0AD4E03A9AE000","device_status":"0"}"#))
            .await
    );
    assert_eq!(rec.version(), version);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Closed));
}

#[tokio::test]
async fn device_status_for_unknown_or_online_device_is_ignored() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    assert!(
        rec.apply_push_event(Some(r#"{"serial":"DEADBEEF0000","device_status":0}"#))
            .await
    );
    assert!(
        rec.apply_push_event(Some(r#"{"serial":"F0AD4E03A9AE000","device_status":1}"#))
            .await
    );
}

#[tokio::test]
async fn online_device_frame_still_applies_door_status() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    let (count, callback) = counter();
    rec.registry().register(garage_key(), callback);

    let frame = r#"{"serial":"F0AD4E03A9AE0","device_status":1,"door":1,"door_status":1}"#;
    assert!(rec.apply_push_event(Some(frame)).await);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Open));
    assert_eq!(hits(&count), 1);
}

#[tokio::test]
async fn offline_device_frame_skips_door_status() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    let (count, callback) = counter();
    rec.registry().register(garage_key(), callback);

    let frame = r#"{"serial":"F0AD4E03A9AE0","device_status":0,"door":1,"door_status":1}"#;
    assert!(!rec.apply_push_event(Some(frame)).await);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Closed));
    assert_eq!(hits(&count), 0);
}

#[tokio::test]
async fn malformed_and_unrelated_frames_are_dropped() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    let version = rec.version();

    assert!(rec.apply_push_event(Some("not json")).await);
    assert!(rec.apply_push_event(Some(r#"{"hello":"world"}"#)).await);
    assert!(
        rec.apply_push_event(Some(r#"{"serial":"ZZZZZZZZZZZZ","door":1,"door_status":1}"#))
            .await
    );
    assert_eq!(rec.version(), version);
}

#[tokio::test]
async fn ambiguous_serial_prefix_drops_push_event() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![
        door(1, 1, "F0AD4E03A9AE000", DoorStatus::Closed),
        door(2, 1, "F0AD4E03A9AE999", DoorStatus::Closed),
    ]);

    let frame = r#"{"serial":"F0AD4E03A9AE000","door":1,"door_status":1}"#;
    assert!(rec.apply_push_event(Some(frame)).await);
    assert_eq!(rec.status(&DoorId::new(1, 1)), Some(DoorStatus::Closed));
    assert_eq!(rec.status(&DoorId::new(2, 1)), Some(DoorStatus::Closed));
    assert!(rec.door_by_key(&garage_key()).is_none());
}

// ── Snapshots ───────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_omission_removes_door() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![
        door(533_255, 1, SERIAL, DoorStatus::Closed),
        door(77, 2, OTHER_SERIAL, DoorStatus::Open),
    ]);

    let (count, callback) = counter();
    rec.registry().register(garage_key(), callback);

    let outcome = rec.apply_snapshot(vec![door(77, 2, OTHER_SERIAL, DoorStatus::Open)]);

    assert_eq!(outcome.doors.len(), 1);
    assert!(rec.door(&garage_id()).is_none());
    assert!(rec.door_by_key(&garage_key()).is_none());
    assert_eq!(hits(&count), 1);
}

#[tokio::test]
async fn snapshot_notifies_only_changed_doors() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![
        door(533_255, 1, SERIAL, DoorStatus::Closed),
        door(77, 2, OTHER_SERIAL, DoorStatus::Open),
    ]);

    let (garage, cb_garage) = counter();
    let (other, cb_other) = counter();
    rec.registry().register(garage_key(), cb_garage);
    rec.registry().register(DoorKey::new("001122334455", 2), cb_other);

    rec.apply_snapshot(vec![
        door(533_255, 1, SERIAL, DoorStatus::Opening),
        door(77, 2, OTHER_SERIAL, DoorStatus::Open),
    ]);

    assert_eq!(hits(&garage), 1);
    assert_eq!(hits(&other), 0);
}

#[tokio::test]
async fn snapshot_is_sorted_by_door_id() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    let outcome = rec.apply_snapshot(vec![
        door(900, 2, OTHER_SERIAL, DoorStatus::Open),
        door(900, 1, OTHER_SERIAL, DoorStatus::Open),
        door(12, 1, SERIAL, DoorStatus::Closed),
    ]);

    let ids: Vec<DoorId> = outcome.doors.iter().map(|d| d.id).collect();
    assert_eq!(
        ids,
        vec![DoorId::new(12, 1), DoorId::new(900, 1), DoorId::new(900, 2)]
    );
}

#[tokio::test]
async fn anchor_disagreement_requires_restart() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);

    let first = rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    assert!(!first.restart_required);

    // Push moved the door; the poll agrees.
    rec.apply_push_event(Some(r#"{"serial":"F0AD4E03A9AE000","door":1,"door_status":1}"#))
        .await;
    let agreeing = rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Open)]);
    assert!(!agreeing.restart_required);

    // The door closed but no push arrived.
    let stale = rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    assert!(stale.restart_required);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Closed));
}

#[tokio::test]
async fn anchor_is_repicked_when_it_disappears() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);

    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    let without_anchor = rec.apply_snapshot(vec![door(77, 2, OTHER_SERIAL, DoorStatus::Open)]);
    assert!(!without_anchor.restart_required);

    let changed = rec.apply_snapshot(vec![door(77, 2, OTHER_SERIAL, DoorStatus::Closed)]);
    assert!(changed.restart_required);
}

// ── Resync ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resync_refetches_and_notifies_everyone() {
    let snapshots = FakeSnapshots::new(vec![
        door(533_255, 1, SERIAL, DoorStatus::Closed),
        door(77, 2, OTHER_SERIAL, DoorStatus::Open),
    ]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(snapshots.fetch_all_doors().await.unwrap());

    let (garage, cb_garage) = counter();
    let (other, cb_other) = counter();
    rec.registry().register(garage_key(), cb_garage);
    rec.registry().register(DoorKey::new("001122334455", 2), cb_other);

    snapshots.set_doors(vec![
        door(533_255, 1, SERIAL, DoorStatus::Open),
        door(77, 2, OTHER_SERIAL, DoorStatus::Open),
    ]);
    assert!(rec.apply_push_event(None).await);

    assert_eq!(snapshots.calls(), 2);
    assert_eq!(rec.status(&garage_id()), Some(DoorStatus::Open));
    // One sweep: the changed door is not notified a second time.
    assert_eq!(hits(&garage), 1);
    assert_eq!(hits(&other), 1);
}

#[tokio::test]
async fn failed_resync_leaves_table_untouched() {
    let snapshots = FakeSnapshots::new(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(snapshots.fetch_all_doors().await.unwrap());
    let version = rec.version();

    let (count, callback) = counter();
    rec.registry().register(garage_key(), callback);

    snapshots.fail_with([SnapshotError::Transient("gateway timeout".into())]);
    assert!(rec.apply_push_event(None).await);

    assert_eq!(rec.version(), version);
    assert_eq!(hits(&count), 0);
}

// ── Streams ─────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribers_see_push_updates() {
    let snapshots = FakeSnapshots::new(vec![]);
    let rec = reconciler(&snapshots);
    rec.apply_snapshot(vec![door(533_255, 1, SERIAL, DoorStatus::Closed)]);

    let mut rx = rec.subscribe();
    rx.mark_unchanged();

    rec.apply_push_event(Some(r#"{"serial":"F0AD4E03A9AE000","door":1,"door_status":2}"#))
        .await;

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot[0].status, DoorStatus::Opening);
}
