//! Pipeline harness wired from real components and scripted sources.

use cawatch_bot::{
    CoordinatorConfig, PipelineCoordinator, RecordingDispatcher, ScheduledRunner, TaskScheduler, Watchlist,
};
use cawatch_core::{
    Chain, Clock, FilterField, FilterRange, ManualClock, MarketData, PushTarget, Task, TimeWindow,
};
use cawatch_persistence::{InMemoryTaskStore, MemoryDedupStore, DEFAULT_DEDUP_TTL};
use cawatch_sources::fakes::StaticSource;
use cawatch_sources::{AggregationOrchestrator, DynSource, OrchestratorConfig};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

pub const SOL: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
pub const BSC: &str = "0x55d398326f99059fF775485246999027B3197955";
pub const LISTEN_CHAT: i64 = -1001234567890;
pub const OWNER: &str = "@owner";
pub const CHANNEL: &str = "@alpha_calls";

/// `hour:minute` on 2026-03-01 in UTC+8.
pub fn local(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(i64::from(hour) - 8)
        + ChronoDuration::minutes(i64::from(minute))
}

/// Task listening on [`LISTEN_CHAT`] with a market-cap and liquidity filter.
pub fn day_task(id: &str) -> Task {
    let mut task = Task::new(id);
    task.name = format!("{id} watcher");
    task.listen_chats = vec![LISTEN_CHAT];
    task.push_targets = vec![PushTarget::direct(OWNER), PushTarget::broadcast(CHANNEL)];
    task.window = Some(TimeWindow::new("09:00", "18:00").unwrap());
    task.filters.set(FilterField::MarketCapUsd, FilterRange::between(10_000.0, 5_000_000.0));
    task.filters.set(FilterField::LiquidityUsd, FilterRange::at_least(5_000.0));
    task
}

/// Market data that passes [`day_task`] filters.
pub fn passing_market() -> MarketData {
    MarketData {
        symbol: Some("WIF".to_string()),
        price_usd: Some(0.0021),
        market_cap_usd: Some(2_100_000.0),
        liquidity_usd: Some(84_000.0),
        holder_count: Some(3120),
        ..Default::default()
    }
}

pub struct Harness {
    pub coordinator: Arc<PipelineCoordinator>,
    pub scheduler: TaskScheduler,
    pub store: Arc<InMemoryTaskStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualClock>,
    pub tracker: TaskTracker,
}

impl Harness {
    /// Real orchestrator over `sources`, no chart or risk side fetches.
    pub fn new(tasks: Vec<Task>, sources: Vec<DynSource>, config: CoordinatorConfig, start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let orchestrator = AggregationOrchestrator::new(
            sources,
            OrchestratorConfig {
                chart_span: None,
                first_trade_span: None,
                ..OrchestratorConfig::default()
            },
        )
        .with_clock(dyn_clock.clone());

        let store = Arc::new(InMemoryTaskStore::with_tasks(tasks).unwrap());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let coordinator = Arc::new(PipelineCoordinator::new(
            store.clone(),
            Arc::new(orchestrator),
            Arc::new(MemoryDedupStore::with_clock(DEFAULT_DEDUP_TTL, dyn_clock.clone())),
            dispatcher.clone(),
            Arc::new(Watchlist::new(DEFAULT_DEDUP_TTL, 50)),
            dyn_clock.clone(),
            config,
        ));
        let tracker = TaskTracker::new();
        let runner: Arc<dyn ScheduledRunner> = coordinator.clone();
        let scheduler = TaskScheduler::new(
            store.clone(),
            runner,
            dyn_clock,
            Duration::from_secs(3),
            tracker.clone(),
        );
        Self {
            coordinator,
            scheduler,
            store,
            dispatcher,
            clock,
            tracker,
        }
    }

    /// Single source that always answers with [`passing_market`].
    pub fn with_market(tasks: Vec<Task>, start: DateTime<Utc>) -> (Self, Arc<StaticSource>) {
        let source = Arc::new(StaticSource::new("primary", passing_market()));
        let harness = Self::new(tasks, vec![source.clone()], CoordinatorConfig::default(), start);
        (harness, source)
    }

    /// Move the clock to `at`, tick once and wait for the launched runs.
    pub async fn tick_at(&self, at: DateTime<Utc>) -> usize {
        self.clock.set(at);
        let launched = self.scheduler.tick();
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        launched
    }

    pub fn delivered_to(&self, chat: &str) -> usize {
        self.dispatcher.records().iter().filter(|r| r.target.chat == chat).count()
    }
}

pub fn chain_of(address: &str) -> Chain {
    if address.starts_with("0x") {
        Chain::Bsc
    } else {
        Chain::Solana
    }
}
