//! Notification dispatch.
//!
//! The coordinator hands each passing candidate to a `Dispatcher` once per
//! push target. A failed send is logged and counted, never retried.

use crate::caption;
use cawatch_core::{ChartSeries, PushTarget, Task, TokenMetrics};
use cawatch_sources::BoxFuture;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Result of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Delivered,
    Failed(String),
}

impl DispatchResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed(_) => "failed",
        }
    }
}

/// Outbound notification sink.
pub trait Dispatcher: Send + Sync {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        metrics: &'a TokenMetrics,
        chart: Option<&'a ChartSeries>,
        task: &'a Task,
    ) -> BoxFuture<'a, DispatchResult>;
}

pub type DynDispatcher = Arc<dyn Dispatcher>;

/// Dry-run dispatcher: renders the caption and logs it.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        metrics: &'a TokenMetrics,
        chart: Option<&'a ChartSeries>,
        task: &'a Task,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            let text = caption::render(metrics, chart, target.kind, Utc::now());
            info!(
                task_id = %task.id,
                target = %target.chat,
                kind = ?target.kind,
                address = %metrics.address,
                caption = %text,
                "Dry-run notification"
            );
            DispatchResult::Delivered
        })
    }
}

/// One recorded send.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub task_id: String,
    pub target: PushTarget,
    pub address: String,
    pub has_chart: bool,
    pub caption: String,
}

/// Test dispatcher that records every send.
#[derive(Default)]
pub struct RecordingDispatcher {
    records: Mutex<Vec<DispatchRecord>>,
    failing_chats: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `chat` report failure (still recorded).
    pub fn fail_chat(&self, chat: impl Into<String>) {
        self.failing_chats.lock().insert(chat.into());
    }

    /// Every send sleeps for `delay` before it is recorded.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Dispatcher for RecordingDispatcher {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        metrics: &'a TokenMetrics,
        chart: Option<&'a ChartSeries>,
        task: &'a Task,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.records.lock().push(DispatchRecord {
                task_id: task.id.to_string(),
                target: target.clone(),
                address: metrics.address.clone(),
                has_chart: chart.is_some(),
                caption: caption::render(metrics, chart, target.kind, metrics.fetched_at),
            });
            if self.failing_chats.lock().contains(&target.chat) {
                DispatchResult::Failed(format!("send to {} failed", target.chat))
            } else {
                DispatchResult::Delivered
            }
        })
    }
}
