//! Address extraction and filter evaluation.
//!
//! Both components are pure: no I/O, no shared state.
//! - `AddressExtractor`: finds candidate contract addresses in free text
//! - `FilterEngine`: checks a `TokenMetrics` record against a `FilterConfig`

pub mod error;
pub mod extractor;
pub mod filter_engine;
pub mod outcome;

pub use error::{DetectorError, DetectorResult};
pub use extractor::{AddressExtractor, Candidate};
pub use filter_engine::FilterEngine;
pub use outcome::{FailureReason, FieldFailure, FilterOutcome};
