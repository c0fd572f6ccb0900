//! Core domain types for the contract-address watch pipeline.
//!
//! This crate provides the types shared by every other crate:
//! - `Chain`, `ChainHint`: supported chains and extractor hints
//! - `TokenMetrics`, `MarketData`: consolidated and partial per-token records
//! - `FilterConfig`, `FilterField`, `FilterRange`: per-task filter rules
//! - `TimeWindow`, `WindowState`: daily activity windows in fixed UTC+8
//! - `Task`, `TaskId`, `PushTarget`, `DedupKey`: monitoring task model
//! - `Clock`: injectable time source

pub mod chain;
pub mod clock;
pub mod error;
pub mod filter;
pub mod task;
pub mod token;
pub mod window;

pub use chain::{Chain, ChainHint};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use filter::{FilterConfig, FilterField, FilterRange};
pub use task::{DedupKey, PushTarget, TargetKind, Task, TaskId};
pub use token::{ChartSeries, MarketData, OhlcvBar, RiskScore, TokenMetrics};
pub use window::{TimeWindow, WindowState, WINDOW_UTC_OFFSET_SECS};
