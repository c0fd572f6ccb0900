//! Task scheduler.
//!
//! On every tick the scheduler re-reads the task store snapshot and advances
//! each task's `Disabled` / `WindowClosed` / `WindowOpen` state. Scheduled
//! re-checks fire only while `WindowOpen`: the first on the tick that enters
//! the window, then one per elapsed interval. Leaving the window cancels the
//! pending fire but never an in-flight run, and a task never has two
//! scheduled runs in flight at once.
//!
//! A task whose store generation changed was removed and added back; its old
//! schedule is dropped exactly as for a removal and a fresh one starts.

use crate::coordinator::window_state;
use cawatch_core::{Clock, TaskId, WindowState};
use cawatch_persistence::DynTaskStore;
use cawatch_sources::BoxFuture;
use cawatch_telemetry::Metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Target of scheduled fires.
pub trait ScheduledRunner: Send + Sync {
    fn run_scheduled<'a>(&'a self, task_id: &'a TaskId) -> BoxFuture<'a, ()>;

    /// Called once when a task disappears from the store or is replaced by
    /// a new generation under the same id.
    fn task_removed(&self, _task_id: &TaskId) {}
}

/// Clears the task's in-flight flag when dropped.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A due scheduled run. Hold the guard until the run completes.
#[derive(Debug)]
pub struct ScheduledFire {
    pub task_id: TaskId,
    pub guard: InFlightGuard,
}

#[derive(Debug)]
struct TaskSchedule {
    generation: u64,
    state: Option<WindowState>,
    interval_secs: Option<u64>,
    next_fire: Option<DateTime<Utc>>,
    last_fire: Option<DateTime<Utc>>,
    in_flight: Arc<AtomicBool>,
}

impl TaskSchedule {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            state: None,
            interval_secs: None,
            next_fire: None,
            last_fire: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

pub struct TaskScheduler {
    tasks: DynTaskStore,
    runner: Arc<dyn ScheduledRunner>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    schedules: Mutex<HashMap<TaskId, TaskSchedule>>,
    tracker: TaskTracker,
}

impl TaskScheduler {
    pub fn new(
        tasks: DynTaskStore,
        runner: Arc<dyn ScheduledRunner>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            tasks,
            runner,
            clock,
            tick_interval,
            schedules: Mutex::new(HashMap::new()),
            tracker,
        }
    }

    /// Last computed state for a task.
    pub fn state(&self, task_id: &TaskId) -> Option<WindowState> {
        self.schedules.lock().get(task_id).and_then(|s| s.state)
    }

    pub fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.schedules
            .lock()
            .get(task_id)
            .is_some_and(|s| s.in_flight.load(Ordering::Acquire))
    }

    /// Advance every task to `now` and return the runs that are due.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Vec<ScheduledFire> {
        let (snapshot, generations) = self.tasks.snapshot_with_generations();
        let mut fires = Vec::new();
        let removed: Vec<TaskId> = {
            let mut schedules = self.schedules.lock();
            let removed: Vec<TaskId> = schedules
                .iter()
                .filter(|(id, schedule)| generations.get(*id) != Some(&schedule.generation))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &removed {
                schedules.remove(id);
            }

            for task in snapshot.values() {
                let state = window_state(task, now);
                let label = task.id.as_str();
                let generation = generations.get(&task.id).copied().unwrap_or_default();
                let schedule = schedules
                    .entry(task.id.clone())
                    .or_insert_with(|| TaskSchedule::new(generation));

                if schedule.state != Some(state) {
                    info!(task_id = %task.id, from = ?schedule.state, to = %state, "Task window state changed");
                    Metrics::task_window_state(label, state.as_gauge());
                    if state.is_open() {
                        schedule.next_fire = task.recheck_interval_secs.map(|_| now);
                    } else if schedule.next_fire.take().is_some() {
                        debug!(task_id = %task.id, "Pending scheduled fire cancelled");
                    }
                    schedule.state = Some(state);
                }

                if schedule.interval_secs != task.recheck_interval_secs {
                    if state.is_open() {
                        schedule.next_fire = task
                            .recheck_interval_secs
                            .map(|s| schedule.last_fire.map_or(now, |last| last + secs(s)));
                    }
                    schedule.interval_secs = task.recheck_interval_secs;
                }

                let (Some(interval), Some(due)) = (task.recheck_interval_secs, schedule.next_fire) else {
                    continue;
                };
                if !state.is_open() || due > now {
                    continue;
                }
                schedule.next_fire = Some(now + secs(interval));
                if schedule.in_flight.swap(true, Ordering::AcqRel) {
                    Metrics::scheduler_skipped(label, "in_flight");
                    debug!(task_id = %task.id, "Previous scheduled run still in flight, skipping");
                    continue;
                }
                schedule.last_fire = Some(now);
                Metrics::scheduler_fired(label);
                fires.push(ScheduledFire {
                    task_id: task.id.clone(),
                    guard: InFlightGuard(schedule.in_flight.clone()),
                });
            }
            removed
        };

        for id in &removed {
            info!(task_id = %id, "Task removed or replaced, dropping scheduler state");
            Metrics::task_removed(id.as_str());
            self.runner.task_removed(id);
        }
        fires
    }

    /// Evaluate at the clock's time and launch due runs.
    pub fn tick(&self) -> usize {
        let fires = self.evaluate(self.clock.now());
        let launched = fires.len();
        for fire in fires {
            let runner = self.runner.clone();
            self.tracker.spawn(async move {
                let ScheduledFire { task_id, guard } = fire;
                debug!(task_id = %task_id, "Scheduled run started");
                runner.run_scheduled(&task_id).await;
                drop(guard);
            });
        }
        launched
    }

    /// Tick until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "Scheduler started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}
