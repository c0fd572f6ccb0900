//! Scheduler integration tests.
//!
//! Drives the window scheduler against the real coordinator with a manual
//! clock, checking which ticks enqueue scheduled re-checks.

mod integration;
use integration::common::fixtures::{day_task, local, Harness, OWNER, SOL};

use cawatch_core::{Chain, Task, TaskId, TimeWindow, WindowState};
use cawatch_persistence::TaskStore;
use chrono::Duration;

fn watching_task(id: &str, start: &str, end: &str, interval_secs: u64) -> Task {
    let mut task = day_task(id);
    task.window = Some(TimeWindow::new(start, end).unwrap());
    task.recheck_interval_secs = Some(interval_secs);
    task.watch_addresses = vec![(Chain::Solana, SOL.to_string())];
    task
}

#[tokio::test]
async fn test_window_entry_fires_then_dedups_on_interval() {
    let task = watching_task("alpha", "09:00", "18:00", 60);
    let (h, source) = Harness::with_market(vec![task], local(8, 59));
    let id = TaskId::new("alpha");

    assert_eq!(h.tick_at(local(8, 59)).await, 0);
    assert_eq!(h.scheduler.state(&id), Some(WindowState::WindowClosed));

    assert_eq!(h.tick_at(local(9, 0)).await, 1);
    assert_eq!(h.scheduler.state(&id), Some(WindowState::WindowOpen));
    assert_eq!(h.delivered_to(OWNER), 1);

    // not yet due
    assert_eq!(h.tick_at(local(9, 0) + Duration::seconds(30)).await, 0);

    assert_eq!(h.tick_at(local(9, 1)).await, 1);
    assert_eq!(h.delivered_to(OWNER), 1, "second run hits the dedup pre-check");
    assert_eq!(source.call_count(), 1);
}

/// 19:00 UTC+8 falls outside 09:00-18:00: no scheduled run is enqueued.
#[tokio::test]
async fn test_closed_window_tick_enqueues_nothing() {
    let task = watching_task("alpha", "09:00", "18:00", 60);
    let (h, source) = Harness::with_market(vec![task], local(19, 0));

    for minute in 0..5 {
        assert_eq!(h.tick_at(local(19, minute)).await, 0);
    }

    assert_eq!(h.scheduler.state(&TaskId::new("alpha")), Some(WindowState::WindowClosed));
    assert_eq!(source.call_count(), 0);
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_cross_midnight_window() {
    let task = watching_task("night", "22:00", "06:00", 600);
    let (h, _source) = Harness::with_market(vec![task], local(21, 59));
    let id = TaskId::new("night");

    assert_eq!(h.tick_at(local(21, 59)).await, 0);
    assert_eq!(h.tick_at(local(22, 0)).await, 1);
    assert_eq!(h.scheduler.state(&id), Some(WindowState::WindowOpen));

    // 05:59 next morning is still inside the window
    let next_morning = local(5, 59) + Duration::days(1);
    assert_eq!(h.tick_at(next_morning).await, 1);

    assert_eq!(h.tick_at(local(6, 0) + Duration::days(1)).await, 0);
    assert_eq!(h.scheduler.state(&id), Some(WindowState::WindowClosed));
}

#[tokio::test]
async fn test_leaving_window_cancels_pending_fire() {
    let task = watching_task("alpha", "09:00", "18:00", 3600);
    let (h, _source) = Harness::with_market(vec![task], local(17, 30));

    assert_eq!(h.tick_at(local(17, 30)).await, 1);
    assert_eq!(h.tick_at(local(18, 0)).await, 0);
    // next fire would have been 18:30; the window is closed
    assert_eq!(h.tick_at(local(18, 30)).await, 0);

    // reopening the next day fires on entry, not on the stale schedule
    assert_eq!(h.tick_at(local(9, 0) + Duration::days(1)).await, 1);
}

#[tokio::test]
async fn test_disable_and_reenable_through_store() {
    let task = watching_task("alpha", "09:00", "18:00", 60);
    let (h, _source) = Harness::with_market(vec![task], local(10, 0));
    let id = TaskId::new("alpha");

    assert_eq!(h.tick_at(local(10, 0)).await, 1);

    h.store.set_enabled(&id, false).unwrap();
    assert_eq!(h.tick_at(local(10, 1)).await, 0);
    assert_eq!(h.scheduler.state(&id), Some(WindowState::Disabled));

    h.store.set_enabled(&id, true).unwrap();
    assert_eq!(h.tick_at(local(10, 2)).await, 1);
}

#[tokio::test]
async fn test_interval_change_applies_on_next_tick() {
    let task = watching_task("alpha", "09:00", "18:00", 3600);
    let (h, _source) = Harness::with_market(vec![task.clone()], local(10, 0));

    assert_eq!(h.tick_at(local(10, 0)).await, 1);
    assert_eq!(h.tick_at(local(10, 5)).await, 0);

    let mut faster = task;
    faster.recheck_interval_secs = Some(60);
    h.store.upsert(faster).unwrap();

    // last fire 10:00 + 60s is already past
    assert_eq!(h.tick_at(local(10, 6)).await, 1);
    assert_eq!(h.tick_at(local(10, 6) + Duration::seconds(30)).await, 0);
    assert_eq!(h.tick_at(local(10, 7)).await, 1);
}

#[tokio::test]
async fn test_removed_task_drops_watchlist() {
    let mut task = watching_task("alpha", "09:00", "18:00", 60);
    task.watch_addresses.clear();
    let (h, _source) = Harness::with_market(vec![task], local(10, 0));
    let id = TaskId::new("alpha");

    // filtered message leaves the address on the watchlist
    h.coordinator.watchlist().observe(&id, Chain::Solana, SOL, local(10, 0));
    assert_eq!(h.tick_at(local(10, 0)).await, 1);
    assert_eq!(h.delivered_to(OWNER), 1);

    h.coordinator.watchlist().observe(&id, Chain::Solana, "So11111111111111111111111111111111111111112", local(10, 0));
    assert!(h.store.remove(&id).unwrap());
    assert_eq!(h.tick_at(local(10, 1)).await, 0);
    assert!(h.scheduler.state(&id).is_none());
    assert!(h.coordinator.watchlist().is_empty(&id));
}

#[tokio::test]
async fn test_re_added_task_drops_old_watchlist() {
    let mut task = watching_task("alpha", "09:00", "18:00", 600);
    task.watch_addresses.clear();
    let (h, source) = Harness::with_market(vec![task.clone()], local(10, 0));
    let id = TaskId::new("alpha");

    assert_eq!(h.tick_at(local(10, 0)).await, 1);
    h.coordinator.watchlist().observe(&id, Chain::Solana, SOL, local(10, 0));

    h.store.remove(&id).unwrap();
    h.store.upsert(task).unwrap();

    // the replacement fires on its own entry tick with an empty watchlist
    assert_eq!(h.tick_at(local(10, 1)).await, 1);
    assert!(h.coordinator.watchlist().is_empty(&id));
    assert_eq!(source.call_count(), 0);
    assert_eq!(h.dispatcher.count(), 0);
}
