//! Filter evaluation results.

use cawatch_core::FilterField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why a single field failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The metrics record has no value for a constrained field.
    Missing,
    BelowMin { value: f64, min: f64 },
    AboveMax { value: f64, max: f64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::BelowMin { value, min } => write!(f, "{value} < min {min}"),
            Self::AboveMax { value, max } => write!(f, "{value} > max {max}"),
        }
    }
}

/// One failed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub field: FilterField,
    pub reason: FailureReason,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Result of evaluating one metrics record.
///
/// `passed` is true iff `failures` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub passed: bool,
    pub failures: Vec<FieldFailure>,
}

impl FilterOutcome {
    pub fn from_failures(failures: Vec<FieldFailure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    /// Names of the failed fields.
    pub fn failed_fields(&self) -> BTreeSet<String> {
        self.failures.iter().map(|f| f.field.to_string()).collect()
    }

    /// Compact `field: reason` list for logs.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
