//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] cawatch_core::CoreError),

    #[error("Detector error: {0}")]
    Detector(#[from] cawatch_detector::DetectorError),

    #[error("Source error: {0}")]
    Source(#[from] cawatch_sources::SourceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] cawatch_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] cawatch_persistence::PersistenceError),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
