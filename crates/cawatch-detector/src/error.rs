//! Detector error types.

use cawatch_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid filter config: {0}")]
    InvalidFilterConfig(#[from] CoreError),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
