//! Shared mutable state for the pipeline.
//!
//! - `DedupStore`: atomic check-and-mark with a fixed TTL per
//!   `(task, chain, address)` key
//! - `TaskStore`: the authoritative task configuration, read as immutable
//!   snapshots and committed atomically

pub mod dedup;
pub mod error;
pub mod task_store;

pub use dedup::{DedupStore, DynDedupStore, MemoryDedupStore, DEFAULT_DEDUP_TTL};
pub use error::{PersistenceError, PersistenceResult};
pub use task_store::{
    DynTaskStore, InMemoryTaskStore, JsonFileTaskStore, TaskGenerations, TaskMap, TaskSnapshot, TaskStore,
};
