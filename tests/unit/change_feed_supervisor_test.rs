//! Unit tests for ChangeFeedSupervisor.
//!
//! Time is paused so the connect timeout and the poll interval can be crossed
//! deterministically. The scripted feed never confirms on its own.

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;

use common::{ScriptedFeed, USER};
use linkshelf::services::change_feed_supervisor::{ChangeFeedSupervisor, ReconcileCallback};
use linkshelf::types::errors::SyncError;
use linkshelf::types::feed::{
    ChangeEvent, ChangeKind, ChangeTable, ChannelState, ChannelStatus, FeedEvent, ReconcileTrigger,
};

const POLL: Duration = Duration::from_secs(5);
const CONNECT: Duration = Duration::from_secs(10);

fn supervisor(feed: Arc<ScriptedFeed>) -> ChangeFeedSupervisor {
    ChangeFeedSupervisor::new(feed, POLL, CONNECT)
}

fn recorder() -> (ReconcileCallback, Arc<Mutex<Vec<ReconcileTrigger>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ReconcileCallback = Arc::new(move |trigger| {
        sink.lock().unwrap().push(trigger);
    });
    (callback, seen)
}

fn count(seen: &Mutex<Vec<ReconcileTrigger>>, trigger: ReconcileTrigger) -> usize {
    seen.lock().unwrap().iter().filter(|t| **t == trigger).count()
}

fn change_batch() -> FeedEvent {
    FeedEvent::Changes(vec![ChangeEvent {
        table: ChangeTable::Bookmarks,
        kind: ChangeKind::Update,
        row_id: "b1".to_string(),
    }])
}

fn subscribed() -> FeedEvent {
    FeedEvent::Status(ChannelStatus::Subscribed)
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_channel_falls_back_to_polling_after_timeout() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();

    sup.activate(USER, callback).await.unwrap();
    assert_eq!(sup.state(), ChannelState::Connecting);
    assert_eq!(feed.last_user().as_deref(), Some(USER));

    tokio::time::sleep(CONNECT - Duration::from_millis(1)).await;
    assert!(!sup.is_polling());
    assert!(seen.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(sup.is_polling());
    assert_eq!(sup.state(), ChannelState::Disconnected);
    assert_eq!(*seen.lock().unwrap(), vec![ReconcileTrigger::ChannelFailure]);

    tokio::time::sleep(POLL).await;
    assert_eq!(count(&seen, ReconcileTrigger::Poll), 1);
    tokio::time::sleep(POLL * 2).await;
    assert_eq!(count(&seen, ReconcileTrigger::Poll), 3);
}

#[tokio::test(start_paused = true)]
async fn subscribed_goes_live_and_cancels_watchdog() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();

    feed.push(subscribed());

    assert_eq!(sup.state(), ChannelState::Live);
    assert!(sup.has_subscription());
    tokio::time::sleep(CONNECT * 3).await;
    assert!(!sup.is_polling());
    assert!(seen.lock().unwrap().is_empty());
}

#[rstest]
#[case::error(ChannelStatus::Error("socket reset".to_string()))]
#[case::closed(ChannelStatus::Closed)]
#[case::timed_out(ChannelStatus::TimedOut)]
#[tokio::test(start_paused = true)]
async fn failure_status_starts_polling_and_reconciles_once(#[case] status: ChannelStatus) {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();
    feed.push(subscribed());

    feed.push(FeedEvent::Status(status.clone()));
    feed.push(FeedEvent::Status(status));

    assert_eq!(sup.state(), ChannelState::Disconnected);
    assert!(sup.is_polling());
    assert_eq!(count(&seen, ReconcileTrigger::ChannelFailure), 1);

    tokio::time::sleep(POLL + Duration::from_millis(1)).await;
    assert_eq!(count(&seen, ReconcileTrigger::Poll), 1);
}

#[tokio::test(start_paused = true)]
async fn recovery_stops_polling() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();
    feed.push(FeedEvent::Status(ChannelStatus::Closed));
    assert!(sup.is_polling());

    feed.push(subscribed());

    assert_eq!(sup.state(), ChannelState::Live);
    assert!(!sup.is_polling());
    tokio::time::sleep(POLL * 4).await;
    assert_eq!(count(&seen, ReconcileTrigger::Poll), 0);
}

#[tokio::test(start_paused = true)]
async fn change_batches_only_reconcile_while_live() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();

    feed.push(change_batch());
    assert_eq!(count(&seen, ReconcileTrigger::Change), 0);

    feed.push(subscribed());
    feed.push(change_batch());
    feed.push(FeedEvent::Changes(Vec::new()));
    assert_eq!(count(&seen, ReconcileTrigger::Change), 1);
}

#[tokio::test(start_paused = true)]
async fn reactivation_keeps_a_single_subscription() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (first, _) = recorder();
    let (second, seen) = recorder();

    sup.activate(USER, first).await.unwrap();
    sup.activate("user-2", second).await.unwrap();

    assert_eq!(feed.subscribe_calls.load(Ordering::SeqCst), 2);
    assert_eq!(feed.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(feed.open_count(), 1);
    assert_eq!(sup.user_id().as_deref(), Some("user-2"));

    // The first sink still receives frames, but its epoch is gone.
    feed.push_to_all(subscribed());
    feed.push_to_all(change_batch());
    assert_eq!(count(&seen, ReconcileTrigger::Change), 1);
}

#[tokio::test(start_paused = true)]
async fn events_after_deactivate_are_ignored() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();
    feed.push(FeedEvent::Status(ChannelStatus::Closed));
    assert!(sup.is_polling());
    let before = seen.lock().unwrap().len();

    sup.deactivate();

    assert_eq!(sup.state(), ChannelState::Disconnected);
    assert!(!sup.is_polling());
    assert!(!sup.has_subscription());
    assert!(!sup.is_active());
    assert_eq!(feed.open_count(), 0);

    feed.push_to_all(subscribed());
    feed.push_to_all(change_batch());
    tokio::time::sleep(CONNECT * 3).await;
    assert_eq!(seen.lock().unwrap().len(), before);
    assert_eq!(sup.state(), ChannelState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn deactivate_is_safe_from_any_state() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());

    sup.deactivate();
    let (callback, _) = recorder();
    sup.activate(USER, callback).await.unwrap();
    sup.deactivate();
    sup.deactivate();

    assert_eq!(feed.open_count(), 0);
    assert_eq!(sup.state(), ChannelState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn foreground_requests_one_reconcile() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();
    sup.activate(USER, callback).await.unwrap();
    feed.push(subscribed());

    sup.set_visibility(true);
    assert_eq!(count(&seen, ReconcileTrigger::Foreground), 0);

    sup.set_visibility(false);
    sup.set_visibility(true);
    sup.set_visibility(true);
    assert_eq!(count(&seen, ReconcileTrigger::Foreground), 1);
}

#[tokio::test(start_paused = true)]
async fn subscribe_failure_degrades_to_polling() {
    let feed = ScriptedFeed::new();
    feed.fail_subscribe.store(true, Ordering::SeqCst);
    let sup = supervisor(feed.clone());
    let (callback, seen) = recorder();

    let err = sup.activate(USER, callback).await.unwrap_err();

    assert!(matches!(err, SyncError::Gateway(_)));
    assert_eq!(sup.state(), ChannelState::Disconnected);
    assert!(sup.is_polling());
    assert!(!sup.has_subscription());
    assert_eq!(*seen.lock().unwrap(), vec![ReconcileTrigger::ChannelFailure]);

    tokio::time::sleep(CONNECT + Duration::from_millis(1)).await;
    assert_eq!(count(&seen, ReconcileTrigger::ChannelFailure), 1);
    assert_eq!(count(&seen, ReconcileTrigger::Poll), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_supervisor_closes_subscription() {
    let feed = ScriptedFeed::new();
    let sup = supervisor(feed.clone());
    let (callback, _) = recorder();
    sup.activate(USER, callback).await.unwrap();
    assert_eq!(feed.open_count(), 1);

    drop(sup);

    assert_eq!(feed.open_count(), 0);
}
