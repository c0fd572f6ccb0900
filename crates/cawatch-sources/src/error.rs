//! Source error types.

use thiserror::Error;

/// Failure of a single upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Network error or non-success status.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Rate limited or blocked (403/429).
    #[error("Blocked by upstream: {0}")]
    Blocked(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The upstream answered but has no data for the address.
    #[error("No data: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// The source does not serve this chain.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl SourceError {
    /// Whether another attempt against the same source may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Blocked(_) | Self::Timeout(_)
        )
    }

    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Unavailable(_) | Self::HttpClient(_) => "unavailable",
            Self::Blocked(_) => "blocked",
            Self::Timeout(_) => "timeout",
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Terminal failure of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Every source that answered had no data for the address.
    #[error("No data found for {0}")]
    NoDataFound(String),

    /// No source produced an answer.
    #[error("All sources unavailable for {0}")]
    AllSourcesUnavailable(String),
}

impl FetchFailure {
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoDataFound(_) => "no_data",
            Self::AllSourcesUnavailable(_) => "unavailable",
        }
    }
}
