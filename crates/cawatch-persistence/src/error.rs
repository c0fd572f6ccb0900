//! Persistence error types.

use cawatch_core::{CoreError, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] CoreError),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Corrupt task file {path}: {reason}")]
    CorruptTaskFile { path: String, reason: String },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
