//! Application wiring.
//!
//! Builds the pipeline from configuration and drives it:
//! - Task store, dedup store and watchlist
//! - Aggregation orchestrator over the configured sources
//! - Window scheduler and Telegram long-poller
//! - Metrics exporter and periodic source statistics

use crate::config::AppConfig;
use crate::coordinator::{CoordinatorConfig, InboundMessage, PipelineCoordinator};
use crate::dispatch::{DynDispatcher, LogDispatcher};
use crate::error::{AppError, AppResult};
use crate::scheduler::TaskScheduler;
use crate::telegram::{TelegramClient, TelegramDispatcher, TelegramPoller};
use crate::watchlist::Watchlist;
use cawatch_core::{Clock, SystemClock};
use cawatch_persistence::{JsonFileTaskStore, MemoryDedupStore, TaskStore};
use cawatch_sources::{
    gmgn_browser_headers, AggregationOrchestrator, BirdeyeChartSource, DexScreenerSource, DynSource,
    FingerprintPool, GmgnHoldersSource, GmgnSource, GoPlusSource, RugCheckSource, DEXSCREENER_SOURCE,
    GMGN_HOLDERS_SOURCE, GMGN_SOURCE,
};
use cawatch_telemetry::{serve_metrics, SourceStatsReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Inbound message queue depth.
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Build the orchestrator over `sources.order`, plus chart and risk sources.
pub fn build_resolver(config: &AppConfig) -> AppResult<AggregationOrchestrator> {
    let policy = config.sources.retry_policy();
    let headers = gmgn_browser_headers(&config.sources.gmgn_base_url, &config.sources.extra_headers());
    let pool = Arc::new(FingerprintPool::with_defaults(
        GMGN_SOURCE,
        &headers,
        policy.attempt_timeout,
    )?);

    let mut sources: Vec<DynSource> = Vec::with_capacity(config.sources.order.len());
    for name in &config.sources.order {
        let source: DynSource = match name.as_str() {
            GMGN_SOURCE => Arc::new(GmgnSource::new(
                pool.clone(),
                config.sources.gmgn_base_url.clone(),
                policy.clone(),
            )),
            GMGN_HOLDERS_SOURCE => Arc::new(GmgnHoldersSource::new(
                pool.clone(),
                config.sources.gmgn_base_url.clone(),
                policy.clone(),
            )),
            DEXSCREENER_SOURCE => Arc::new(DexScreenerSource::new(
                config.sources.dexscreener_base_url.clone(),
                policy.clone(),
            )?),
            other => return Err(AppError::Config(format!("Unknown source in sources.order: {other}"))),
        };
        sources.push(source);
    }

    let mut resolver = AggregationOrchestrator::new(sources, config.orchestrator_config());

    if config.chart.enabled || config.chart.first_trade_lookup {
        resolver = resolver.with_chart(Arc::new(BirdeyeChartSource::new(
            config.chart.birdeye_base_url.clone(),
            config.chart.birdeye_api_key.clone(),
            Duration::from_millis(config.chart.timeout_ms),
        )?));
    }

    let risk_timeout = Duration::from_millis(config.risk.timeout_ms);
    if config.risk.rugcheck_enabled {
        resolver = resolver.with_risk(Arc::new(RugCheckSource::new(
            config.risk.rugcheck_base_url.clone(),
            risk_timeout,
        )?));
    }
    if config.risk.goplus_enabled {
        resolver = resolver.with_risk(Arc::new(GoPlusSource::new(
            config.risk.goplus_base_url.clone(),
            risk_timeout,
        )?));
    }

    Ok(resolver)
}

fn build_telegram_client(config: &AppConfig) -> AppResult<Option<Arc<TelegramClient>>> {
    let Some(token) = config
        .telegram
        .bot_token
        .clone()
        .filter(|t| !t.trim().is_empty())
    else {
        return Ok(None);
    };
    // Long-poll requests must outlive the server-side wait.
    let timeout = Duration::from_secs(config.telegram.poll_timeout_secs + 15);
    let client = TelegramClient::new(config.telegram.api_base_url.clone(), token, timeout)?;
    Ok(Some(Arc::new(client)))
}

/// Main application.
pub struct Application {
    config: AppConfig,
    dedup: Arc<MemoryDedupStore>,
    coordinator: Arc<PipelineCoordinator>,
    scheduler: Arc<TaskScheduler>,
    telegram: Option<Arc<TelegramClient>>,
    source_stats: SourceStatsReporter,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let tasks = Arc::new(JsonFileTaskStore::open(&config.tasks_path)?);
        info!(
            path = %config.tasks_path,
            tasks = tasks.snapshot().len(),
            "Task store loaded"
        );

        let dedup = Arc::new(MemoryDedupStore::with_clock(config.dedup_ttl(), clock.clone()));
        let resolver = build_resolver(&config)?;
        let source_stats = SourceStatsReporter::new(resolver.source_names());
        let telegram = build_telegram_client(&config)?;

        let dispatcher: DynDispatcher = if config.is_dry_run() {
            Arc::new(LogDispatcher)
        } else {
            let client = telegram
                .clone()
                .ok_or_else(|| AppError::Config("live mode requires telegram.bot_token".to_string()))?;
            Arc::new(TelegramDispatcher::new(client))
        };

        let watchlist = Arc::new(Watchlist::new(
            config.dedup_ttl(),
            config.pipeline.watchlist_capacity,
        ));
        let coordinator = Arc::new(PipelineCoordinator::new(
            tasks.clone(),
            Arc::new(resolver),
            dedup.clone(),
            dispatcher,
            watchlist,
            clock.clone(),
            CoordinatorConfig {
                gate_messages_on_window: config.pipeline.gate_messages_on_window,
                ignore_bot_senders: config.pipeline.ignore_bot_senders,
                run_timeout: config.run_timeout(),
                dispatch_timeout: config.dispatch_timeout(),
            },
        ));

        let tracker = TaskTracker::new();
        let scheduler = Arc::new(TaskScheduler::new(
            tasks,
            coordinator.clone(),
            clock,
            config.tick_interval(),
            tracker.clone(),
        ));

        Ok(Self {
            config,
            dedup,
            coordinator,
            scheduler,
            telegram,
            source_stats,
            tracker,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops [`Application::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl-C or the shutdown token fires, then drain in-flight runs.
    pub async fn run(self) -> AppResult<()> {
        info!(mode = ?self.config.mode, "Starting CA watch pipeline");

        let (tx, mut rx) = mpsc::channel::<InboundMessage>(INBOUND_CHANNEL_CAPACITY);

        let scheduler_handle = tokio::spawn(self.scheduler.clone().run(self.shutdown.clone()));
        let sweeper_handle = self.dedup.clone().spawn_sweeper(
            Duration::from_secs(self.config.pipeline.dedup_sweep_interval_secs),
            self.shutdown.clone(),
        );

        let poller_handle = match &self.telegram {
            Some(client) => {
                let poller = TelegramPoller::new(client.clone(), self.config.telegram.poll_timeout_secs);
                Some(tokio::spawn(poller.run(tx.clone(), self.shutdown.clone())))
            }
            None => {
                warn!("telegram.bot_token not set; inbound messages disabled");
                None
            }
        };

        if let Some(addr) = self.config.telemetry.metrics_addr {
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(addr, async move { token.cancelled().await }).await {
                    error!(error = %e, "Metrics exporter failed");
                }
            });
        }

        let mut stats_interval =
            tokio::time::interval(Duration::from_secs(self.config.telemetry.stats_interval_secs));
        // First tick completes immediately.
        stats_interval.tick().await;

        loop {
            tokio::select! {
                Some(message) = rx.recv() => {
                    let coordinator = self.coordinator.clone();
                    self.tracker.spawn(async move {
                        coordinator.on_message(&message).await;
                    });
                }

                _ = stats_interval.tick() => {
                    self.source_stats.output_summary();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }

                _ = self.shutdown.cancelled() => {
                    break;
                }
            }
        }

        self.shutdown.cancel();
        drop(tx);
        if let Err(e) = scheduler_handle.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
        if let Some(handle) = poller_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Telegram poller ended abnormally");
            }
        }
        if let Err(e) = sweeper_handle.await {
            warn!(error = %e, "Dedup sweeper ended abnormally");
        }

        self.tracker.close();
        info!(in_flight = self.tracker.len(), "Waiting for in-flight runs");
        self.tracker.wait().await;

        self.source_stats.output_summary();
        info!("Application shutdown complete");
        Ok(())
    }
}
