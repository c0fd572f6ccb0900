//! Application configuration.
//!
//! Loaded from a TOML file layered with `CAWATCH__SECTION__KEY` environment
//! overrides. The task set is not part of this file; it lives in the task
//! store at `tasks_path`.

use crate::error::{AppError, AppResult};
use cawatch_core::FilterField;
use cawatch_sources::{
    ChartSpan, OrchestratorConfig, RetryPolicy, DEFAULT_BIRDEYE_BASE_URL, DEFAULT_DEXSCREENER_BASE_URL,
    DEFAULT_GMGN_BASE_URL, DEFAULT_GOPLUS_BASE_URL, DEFAULT_RUGCHECK_BASE_URL, DEXSCREENER_SOURCE,
    GMGN_HOLDERS_SOURCE, GMGN_SOURCE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Environment override prefix.
pub const ENV_PREFIX: &str = "CAWATCH";

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Notifications go to Telegram.
    Live,
    /// Notifications are only logged.
    #[default]
    DryRun,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick cadence (ms). Default: 3000.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    3000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Drop messages for a task while its window is closed. Default: true.
    #[serde(default = "default_true")]
    pub gate_messages_on_window: bool,
    /// Drop messages sent by bots. Default: false.
    #[serde(default)]
    pub ignore_bot_senders: bool,
    /// Upper bound on pre-check, resolve and filter (seconds). Default: 120.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Upper bound on each send once a key is marked (seconds). Default: 30.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Dedup mark lifetime (seconds). Default: 86400.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Expired-mark sweep cadence (seconds). Default: 300.
    #[serde(default = "default_dedup_sweep_interval_secs")]
    pub dedup_sweep_interval_secs: u64,
    /// Per-task watchlist bound. Default: 200.
    #[serde(default = "default_watchlist_capacity")]
    pub watchlist_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_run_timeout_secs() -> u64 {
    120
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_dedup_ttl_secs() -> u64 {
    86_400
}

fn default_dedup_sweep_interval_secs() -> u64 {
    300
}

fn default_watchlist_capacity() -> usize {
    200
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gate_messages_on_window: true,
            ignore_bot_senders: false,
            run_timeout_secs: default_run_timeout_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_sweep_interval_secs: default_dedup_sweep_interval_secs(),
            watchlist_capacity: default_watchlist_capacity(),
        }
    }
}

/// Primary source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Waterfall order.
    #[serde(default = "default_source_order")]
    pub order: Vec<String>,
    /// Fields that end the waterfall once populated.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<FilterField>,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_gmgn_base_url")]
    pub gmgn_base_url: String,
    /// Extra headers sent with every GMGN request (cookies and similar).
    #[serde(default)]
    pub gmgn_extra_headers: BTreeMap<String, String>,
    #[serde(default = "default_dexscreener_base_url")]
    pub dexscreener_base_url: String,
}

fn default_source_order() -> Vec<String> {
    vec![
        GMGN_SOURCE.to_string(),
        GMGN_HOLDERS_SOURCE.to_string(),
        DEXSCREENER_SOURCE.to_string(),
    ]
}

fn default_required_fields() -> Vec<FilterField> {
    vec![
        FilterField::MarketCapUsd,
        FilterField::LiquidityUsd,
        FilterField::Top10Ratio,
        FilterField::MaxHolderRatio,
    ]
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    4000
}

fn default_gmgn_base_url() -> String {
    DEFAULT_GMGN_BASE_URL.to_string()
}

fn default_dexscreener_base_url() -> String {
    DEFAULT_DEXSCREENER_BASE_URL.to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            order: default_source_order(),
            required_fields: default_required_fields(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            gmgn_base_url: default_gmgn_base_url(),
            gmgn_extra_headers: BTreeMap::new(),
            dexscreener_base_url: default_dexscreener_base_url(),
        }
    }
}

impl SourcesConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn extra_headers(&self) -> Vec<(String, String)> {
        self.gmgn_extra_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Chart and first-trade lookup settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_birdeye_base_url")]
    pub birdeye_base_url: String,
    /// Birdeye API key. Without it the chart source reports unsupported.
    #[serde(default)]
    pub birdeye_api_key: Option<String>,
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u32,
    #[serde(default = "default_chart_resolution")]
    pub resolution: String,
    #[serde(default = "default_true")]
    pub first_trade_lookup: bool,
    #[serde(default = "default_first_trade_lookback_days")]
    pub first_trade_lookback_days: u32,
    #[serde(default = "default_side_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_birdeye_base_url() -> String {
    DEFAULT_BIRDEYE_BASE_URL.to_string()
}

fn default_lookback_minutes() -> u32 {
    60
}

fn default_chart_resolution() -> String {
    "1m".to_string()
}

fn default_first_trade_lookback_days() -> u32 {
    30
}

fn default_side_timeout_ms() -> u64 {
    15_000
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            birdeye_base_url: default_birdeye_base_url(),
            birdeye_api_key: None,
            lookback_minutes: default_lookback_minutes(),
            resolution: default_chart_resolution(),
            first_trade_lookup: true,
            first_trade_lookback_days: default_first_trade_lookback_days(),
            timeout_ms: default_side_timeout_ms(),
        }
    }
}

impl fmt::Debug for ChartConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartConfig")
            .field("enabled", &self.enabled)
            .field("birdeye_base_url", &self.birdeye_base_url)
            .field("birdeye_api_key", &self.birdeye_api_key.as_ref().map(|_| "<redacted>"))
            .field("lookback_minutes", &self.lookback_minutes)
            .field("resolution", &self.resolution)
            .field("first_trade_lookup", &self.first_trade_lookup)
            .field("first_trade_lookback_days", &self.first_trade_lookback_days)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Risk source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_true")]
    pub rugcheck_enabled: bool,
    #[serde(default = "default_rugcheck_base_url")]
    pub rugcheck_base_url: String,
    #[serde(default = "default_true")]
    pub goplus_enabled: bool,
    #[serde(default = "default_goplus_base_url")]
    pub goplus_base_url: String,
    #[serde(default = "default_side_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rugcheck_base_url() -> String {
    DEFAULT_RUGCHECK_BASE_URL.to_string()
}

fn default_goplus_base_url() -> String {
    DEFAULT_GOPLUS_BASE_URL.to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            rugcheck_enabled: true,
            rugcheck_base_url: default_rugcheck_base_url(),
            goplus_enabled: true,
            goplus_base_url: default_goplus_base_url(),
            timeout_ms: default_side_timeout_ms(),
        }
    }
}

/// Telegram Bot API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Required in live mode. Prefer `CAWATCH__TELEGRAM__BOT_TOKEN`.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
    /// Long-poll timeout for `getUpdates` (seconds). Default: 30.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: default_telegram_api_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `/metrics` listen address. Exporter disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    /// Source statistics summary cadence (seconds). Default: 3600.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    3600
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_addr: None,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: RunMode,
    /// JSON task store path.
    #[serde(default = "default_tasks_path")]
    pub tasks_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_tasks_path() -> String {
    "config/tasks.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            tasks_path: default_tasks_path(),
            scheduler: SchedulerConfig::default(),
            pipeline: PipelineConfig::default(),
            sources: SourcesConfig::default(),
            chart: ChartConfig::default(),
            risk: RiskConfig::default(),
            telegram: TelegramConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file with environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        Self::build(config::File::with_name(path).format(config::FileFormat::Toml).required(true))
    }

    /// Load from TOML text with environment overrides.
    pub fn from_toml_str(raw: &str) -> AppResult<Self> {
        Self::build(config::File::from_str(raw, config::FileFormat::Toml))
    }

    fn build<S>(file: S) -> AppResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sources.order")
                    .with_list_parse_key("sources.required_fields")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(AppError::Config("scheduler.tick_interval_ms must be > 0".to_string()));
        }
        if self.pipeline.run_timeout_secs == 0 || self.pipeline.dedup_ttl_secs == 0 {
            return Err(AppError::Config(
                "pipeline.run_timeout_secs and pipeline.dedup_ttl_secs must be > 0".to_string(),
            ));
        }
        if self.pipeline.dispatch_timeout_secs == 0 {
            return Err(AppError::Config("pipeline.dispatch_timeout_secs must be > 0".to_string()));
        }
        if self.pipeline.dedup_sweep_interval_secs == 0 || self.telemetry.stats_interval_secs == 0 {
            return Err(AppError::Config("sweep and stats intervals must be > 0".to_string()));
        }
        if self.sources.order.is_empty() {
            return Err(AppError::Config("sources.order must name at least one source".to_string()));
        }
        for name in &self.sources.order {
            if ![GMGN_SOURCE, GMGN_HOLDERS_SOURCE, DEXSCREENER_SOURCE].contains(&name.as_str()) {
                return Err(AppError::Config(format!("Unknown source in sources.order: {name}")));
            }
        }
        if self.sources.max_attempts == 0 {
            return Err(AppError::Config("sources.max_attempts must be > 0".to_string()));
        }
        if self.mode == RunMode::Live
            && self.telegram.bot_token.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(AppError::Config("live mode requires telegram.bot_token".to_string()));
        }
        Ok(())
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == RunMode::DryRun
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.run_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.dispatch_timeout_secs)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.pipeline.dedup_ttl_secs)
    }

    /// Orchestrator settings derived from `[sources]` and `[chart]`.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let chart = &self.chart;
        OrchestratorConfig {
            required_fields: self.sources.required_fields.clone(),
            chart_span: chart.enabled.then(|| ChartSpan::Recent {
                minutes: chart.lookback_minutes,
                resolution: chart.resolution.clone(),
            }),
            first_trade_span: chart.first_trade_lookup.then(|| ChartSpan::History {
                days: chart.first_trade_lookback_days,
                resolution: "1H".to_string(),
            }),
            side_timeout: Duration::from_millis(chart.timeout_ms.max(self.risk.timeout_ms)),
        }
    }
}
