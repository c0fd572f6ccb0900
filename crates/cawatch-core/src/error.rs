//! Error types for cawatch-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid filter config for {field}: {reason}")]
    InvalidFilterConfig { field: String, reason: String },

    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("Unknown filter field: {0}")]
    UnknownFilterField(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
