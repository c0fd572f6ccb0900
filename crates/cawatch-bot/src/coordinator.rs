//! Pipeline coordinator.
//!
//! Both entry points converge on one path per `(task, chain, address)` work
//! item: dedup pre-check, resolve, filter, atomic check-and-mark, dispatch.
//! Work items are independent and run concurrently; only a key that passes
//! the filter is ever marked.
//!
//! The run timeout bounds the stages before the mark. Once a key is marked,
//! dispatch always runs to completion, each send under its own timeout.

use crate::dispatch::{DispatchResult, DynDispatcher};
use crate::scheduler::ScheduledRunner;
use crate::watchlist::Watchlist;
use cawatch_core::{Chain, Clock, DedupKey, FilterField, Task, TaskId, TokenMetrics, WindowState};
use cawatch_detector::{AddressExtractor, FilterEngine};
use cawatch_persistence::{DynDedupStore, DynTaskStore};
use cawatch_sources::{BoxFuture, DynResolver, FetchFailure};
use cawatch_telemetry::Metrics;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub sender_is_bot: bool,
}

impl InboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            sender_is_bot: false,
        }
    }
}

/// What started a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Message,
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Terminal state of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Passed and handed to every push target.
    Dispatched { delivered: usize, failed: usize },
    /// Already notified within the TTL.
    AlreadyNotified,
    /// Failed the filter on these fields.
    Filtered(Vec<String>),
    NoData,
    Unavailable,
    /// The task's filter config was rejected.
    InvalidFilter(String),
    TimedOut,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::AlreadyNotified => "deduped",
            Self::Filtered(_) => "filtered",
            Self::NoData => "no_data",
            Self::Unavailable => "unavailable",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::TimedOut => "timeout",
        }
    }

    /// Outcomes that leave the address on the watchlist.
    fn keeps_watching(&self) -> bool {
        matches!(self, Self::Filtered(_) | Self::NoData | Self::Unavailable | Self::TimedOut)
    }
}

/// One finished work item.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub task_id: TaskId,
    pub chain: Chain,
    pub address: String,
    pub outcome: RunOutcome,
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Drop messages for a task while its window is closed.
    pub gate_messages_on_window: bool,
    pub ignore_bot_senders: bool,
    /// Budget for pre-check, resolve and filter.
    pub run_timeout: Duration,
    /// Budget for each send after the key is marked.
    pub dispatch_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gate_messages_on_window: true,
            ignore_bot_senders: false,
            run_timeout: Duration::from_secs(120),
            dispatch_timeout: Duration::from_secs(30),
        }
    }
}

struct WorkItem {
    task: Task,
    chain: Chain,
    address: String,
    trigger: Trigger,
}

/// Result of the bounded stages of a run.
enum Evaluation {
    Done(RunOutcome),
    Passed(Box<TokenMetrics>),
}

/// Wires extraction, resolution, filtering, dedup and dispatch.
pub struct PipelineCoordinator {
    tasks: DynTaskStore,
    resolver: DynResolver,
    dedup: DynDedupStore,
    dispatcher: DynDispatcher,
    watchlist: Arc<Watchlist>,
    clock: Arc<dyn Clock>,
    extractor: AddressExtractor,
    filter: FilterEngine,
    config: CoordinatorConfig,
}

impl PipelineCoordinator {
    pub fn new(
        tasks: DynTaskStore,
        resolver: DynResolver,
        dedup: DynDedupStore,
        dispatcher: DynDispatcher,
        watchlist: Arc<Watchlist>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            tasks,
            resolver,
            dedup,
            dispatcher,
            watchlist,
            clock,
            extractor: AddressExtractor::new(),
            filter: FilterEngine::new(),
            config,
        }
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    /// Event-driven entry point.
    pub async fn on_message(&self, message: &InboundMessage) -> Vec<RunReport> {
        if self.config.ignore_bot_senders && message.sender_is_bot {
            Metrics::message("ignored_bot");
            return Vec::new();
        }
        let candidates = self.extractor.extract(&message.text);
        if candidates.is_empty() {
            Metrics::message("no_address");
            return Vec::new();
        }

        let now = self.clock.now();
        let snapshot = self.tasks.snapshot();
        let mut items = Vec::new();
        for task in snapshot.values().filter(|t| t.enabled && t.listens_on(message.chat_id)) {
            if self.config.gate_messages_on_window && !window_state(task, now).is_open() {
                debug!(task_id = %task.id, chat_id = message.chat_id, "Window closed, message dropped for task");
                Metrics::scheduler_skipped(task.id.as_str(), "message_outside_window");
                continue;
            }
            for candidate in &candidates {
                items.push(WorkItem {
                    task: task.clone(),
                    chain: Chain::from_hint(candidate.hint, task.evm_chain),
                    address: candidate.address.clone(),
                    trigger: Trigger::Message,
                });
            }
        }

        if items.is_empty() {
            Metrics::message("no_task");
            return Vec::new();
        }
        Metrics::message("accepted");
        info!(
            chat_id = message.chat_id,
            candidates = candidates.len(),
            work_items = items.len(),
            "Message accepted"
        );
        self.run_all(items).await
    }

    /// Scheduler entry point: re-check configured and watchlisted addresses.
    pub async fn on_scheduled_tick(&self, task_id: &TaskId) -> Vec<RunReport> {
        let Some(task) = self.tasks.get(task_id) else {
            debug!(task_id = %task_id, "Scheduled tick for unknown task");
            return Vec::new();
        };
        if !task.enabled {
            return Vec::new();
        }

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let watched = self.watchlist.addresses(task_id, now);
        for (chain, address) in task.watch_addresses.iter().cloned().chain(watched) {
            if seen.insert(DedupKey::new(task.id.clone(), chain, &address)) {
                items.push(WorkItem {
                    task: task.clone(),
                    chain,
                    address,
                    trigger: Trigger::Scheduled,
                });
            }
        }
        debug!(task_id = %task_id, work_items = items.len(), "Scheduled re-check");
        self.run_all(items).await
    }

    /// Drop all derived state for a removed task.
    pub fn forget_task(&self, task_id: &TaskId) {
        self.watchlist.drop_task(task_id);
    }

    async fn run_all(&self, items: Vec<WorkItem>) -> Vec<RunReport> {
        join_all(items.into_iter().map(|item| self.run_item(item))).await
    }

    async fn run_item(&self, item: WorkItem) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            %run_id,
            task_id = %item.task.id,
            chain = %item.chain,
            address = %item.address,
            trigger = item.trigger.as_str(),
        );
        async move {
            Metrics::run_started();
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.config.run_timeout, self.evaluate(&item)).await {
                Ok(Evaluation::Done(outcome)) => outcome,
                Ok(Evaluation::Passed(metrics)) => self.mark_and_dispatch(&item, &metrics).await,
                Err(_) => {
                    warn!(timeout_secs = self.config.run_timeout.as_secs(), "Pipeline run timed out before mark");
                    RunOutcome::TimedOut
                }
            };
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            Metrics::run_finished(item.trigger.as_str(), outcome.label(), elapsed_ms);

            if item.trigger == Trigger::Message && outcome.keeps_watching() {
                self.watchlist
                    .observe(&item.task.id, item.chain, &item.address, self.clock.now());
            }
            info!(outcome = outcome.label(), elapsed_ms, "Pipeline run finished");
            RunReport {
                task_id: item.task.id,
                chain: item.chain,
                address: item.address,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    /// Pre-check, resolve and filter. Never marks.
    async fn evaluate(&self, item: &WorkItem) -> Evaluation {
        let task = &item.task;
        let task_label = task.id.as_str();
        let key = DedupKey::new(task.id.clone(), item.chain, &item.address);

        if self.dedup.is_marked(&key).await {
            Metrics::dedup_hit(task_label, "pre_check");
            self.watchlist.remove(&task.id, item.chain, &item.address);
            debug!("Already notified, skipping fetch");
            return Evaluation::Done(RunOutcome::AlreadyNotified);
        }

        let constrained: Vec<FilterField> = task.filters.constrained().map(|(field, _)| field.clone()).collect();
        let metrics = match self.resolver.resolve(item.chain, &item.address, &constrained).await {
            Ok(metrics) => metrics,
            Err(FetchFailure::NoDataFound(_)) => return Evaluation::Done(RunOutcome::NoData),
            Err(FetchFailure::AllSourcesUnavailable(_)) => return Evaluation::Done(RunOutcome::Unavailable),
        };

        let outcome = match self.filter.evaluate_at(&metrics, &task.filters, self.clock.now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Task filter rejected");
                return Evaluation::Done(RunOutcome::InvalidFilter(e.to_string()));
            }
        };
        if !outcome.passed {
            Metrics::filter_result(task_label, "fail");
            let fields: Vec<String> = outcome.failed_fields().into_iter().collect();
            for field in &fields {
                Metrics::filter_failed_field(task_label, field);
            }
            debug!(failures = %outcome.summary(), "Filter failed");
            return Evaluation::Done(RunOutcome::Filtered(fields));
        }
        Metrics::filter_result(task_label, "pass");
        Evaluation::Passed(Box::new(metrics))
    }

    async fn mark_and_dispatch(&self, item: &WorkItem, metrics: &TokenMetrics) -> RunOutcome {
        let task = &item.task;
        let task_label = task.id.as_str();
        let key = DedupKey::new(task.id.clone(), item.chain, &item.address);

        if self.dedup.check_and_mark(&key).await {
            Metrics::dedup_hit(task_label, "mark");
            debug!("Lost dedup race, another run notified");
            return RunOutcome::AlreadyNotified;
        }
        self.watchlist.remove(&task.id, item.chain, &item.address);

        self.dispatch(task, metrics).await
    }

    async fn dispatch(&self, task: &Task, metrics: &TokenMetrics) -> RunOutcome {
        let sends = task.push_targets.iter().map(|target| async move {
            let send = self.dispatcher.send(target, metrics, metrics.chart.as_ref(), task);
            let result = match tokio::time::timeout(self.config.dispatch_timeout, send).await {
                Ok(result) => result,
                Err(_) => DispatchResult::Failed(format!(
                    "send timed out after {}s",
                    self.config.dispatch_timeout.as_secs()
                )),
            };
            let kind = match target.kind {
                cawatch_core::TargetKind::DirectMessage => "direct_message",
                cawatch_core::TargetKind::Broadcast => "broadcast",
            };
            Metrics::dispatch(kind, result.outcome());
            if let DispatchResult::Failed(reason) = &result {
                warn!(target = %target.chat, %reason, "Dispatch failed");
            }
            result
        });
        let results = join_all(sends).await;
        let delivered = results.iter().filter(|r| r.is_delivered()).count();
        let failed = results.len() - delivered;
        if task.push_targets.is_empty() {
            warn!("Task has no push targets");
        }
        info!(
            delivered,
            failed,
            symbol = %metrics.label(),
            sources = ?metrics.sources,
            "Notification dispatched"
        );
        RunOutcome::Dispatched { delivered, failed }
    }
}

/// Window state of a task at `now`. A malformed window reads as closed.
pub fn window_state(task: &Task, now: chrono::DateTime<chrono::Utc>) -> WindowState {
    if !task.enabled {
        return WindowState::Disabled;
    }
    let Some(window) = &task.window else {
        return WindowState::WindowOpen;
    };
    match window.is_open_at(now) {
        Ok(true) => WindowState::WindowOpen,
        Ok(false) => WindowState::WindowClosed,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Malformed window, treating as closed");
            WindowState::WindowClosed
        }
    }
}

impl ScheduledRunner for PipelineCoordinator {
    fn run_scheduled<'a>(&'a self, task_id: &'a TaskId) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let reports = self.on_scheduled_tick(task_id).await;
            let dispatched = reports
                .iter()
                .filter(|r| matches!(r.outcome, RunOutcome::Dispatched { .. }))
                .count();
            debug!(task_id = %task_id, runs = reports.len(), dispatched, "Scheduled run complete");
        })
    }

    fn task_removed(&self, task_id: &TaskId) {
        self.forget_task(task_id);
    }
}
