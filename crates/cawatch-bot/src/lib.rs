//! Contract-address watch pipeline.
//!
//! Main application that orchestrates all components:
//! - Telegram long-poll intake and window-gated message routing
//! - UTC+8 window scheduler with per-task intervals
//! - Multi-source metrics resolution with fallback and retry
//! - Filter evaluation, TTL dedup and push dispatch

pub mod app;
pub mod caption;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod scheduler;
pub mod telegram;
pub mod watchlist;

pub use app::{build_resolver, Application};
pub use config::{AppConfig, RunMode};
pub use coordinator::{
    window_state, CoordinatorConfig, InboundMessage, PipelineCoordinator, RunOutcome, RunReport, Trigger,
};
pub use dispatch::{
    DispatchRecord, DispatchResult, Dispatcher, DynDispatcher, LogDispatcher, RecordingDispatcher,
};
pub use error::{AppError, AppResult};
pub use scheduler::{ScheduledRunner, TaskScheduler};
pub use telegram::{TelegramClient, TelegramDispatcher, TelegramPoller};
pub use watchlist::Watchlist;
