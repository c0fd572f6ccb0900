//! TTL dedup store.
//!
//! `check_and_mark` is the only synchronization point the pipeline relies on:
//! for one key, no two concurrent callers may both observe "not seen". A
//! mark is never extended by later calls; it lapses once its TTL passes.

use cawatch_core::{Clock, DedupKey, SystemClock};
use cawatch_telemetry::Metrics;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default mark lifetime.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Keyed check-and-mark store.
///
/// Async so an external TTL-capable cache can back it.
pub trait DedupStore: Send + Sync {
    /// Returns `true` if the key was already marked and unexpired. Otherwise
    /// marks it with expiry `now + ttl` and returns `false`.
    fn check_and_mark<'a>(&'a self, key: &'a DedupKey) -> BoxFuture<'a, bool>;

    /// Non-marking lookup.
    fn is_marked<'a>(&'a self, key: &'a DedupKey) -> BoxFuture<'a, bool>;
}

pub type DynDedupStore = Arc<dyn DedupStore>;

/// In-process store on a sharded map with periodic sweep.
pub struct MemoryDedupStore {
    /// Key -> expiry instant.
    entries: DashMap<DedupKey, DateTime<Utc>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryDedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64),
            clock,
        }
    }

    /// Synchronous form of `check_and_mark`.
    ///
    /// The entry guard holds the shard lock across the read and the write.
    pub fn mark(&self, key: &DedupKey) -> bool {
        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let seen = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    true
                } else {
                    entry.insert(expires_at);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                false
            }
        };
        if !seen {
            debug!(key = %key, %expires_at, "Dedup key marked");
            Metrics::dedup_entries(self.entries.len() as i64);
        }
        seen
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        let now = self.clock.now();
        self.entries.get(key).is_some_and(|expires_at| *expires_at > now)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        let remaining = self.entries.len();
        Metrics::dedup_entries(remaining as i64);
        before.saturating_sub(remaining)
    }

    /// Sweep on `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Dedup sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = self.len(), "Dedup sweep");
                        }
                    }
                }
            }
        })
    }
}

impl Default for MemoryDedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl DedupStore for MemoryDedupStore {
    fn check_and_mark<'a>(&'a self, key: &'a DedupKey) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.mark(key) })
    }

    fn is_marked<'a>(&'a self, key: &'a DedupKey) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.contains(key) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cawatch_core::{Chain, ManualClock, TaskId};
    use chrono::TimeZone;

    fn key(addr: &str) -> DedupKey {
        DedupKey::new(TaskId::new("t1"), Chain::Solana, addr)
    }

    fn store() -> (Arc<ManualClock>, MemoryDedupStore) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()));
        let store = MemoryDedupStore::with_clock(DEFAULT_DEDUP_TTL, clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_check_and_mark_then_seen() {
        let (_, store) = store();
        let k = key("So11111111111111111111111111111111111111112");
        assert!(!store.check_and_mark(&k).await);
        assert!(store.check_and_mark(&k).await);
        assert!(store.is_marked(&k).await);
    }

    #[tokio::test]
    async fn test_expires_after_ttl_without_extension() {
        let (clock, store) = store();
        let k = key("So11111111111111111111111111111111111111112");
        assert!(!store.check_and_mark(&k).await);

        clock.advance(chrono::Duration::hours(23));
        // seen, and the hit does not push expiry out
        assert!(store.check_and_mark(&k).await);

        clock.advance(chrono::Duration::hours(1));
        assert!(!store.is_marked(&k).await);
        assert!(!store.check_and_mark(&k).await);
        assert!(store.check_and_mark(&k).await);
    }

    #[test]
    fn test_keys_are_per_task_and_evm_case_insensitive() {
        let (_, store) = store();
        let addr = "0x55d398326f99059fF775485246999027B3197955";
        let a = DedupKey::new(TaskId::new("a"), Chain::Bsc, addr);
        let a_lower = DedupKey::new(TaskId::new("a"), Chain::Bsc, &addr.to_lowercase());
        let b = DedupKey::new(TaskId::new("b"), Chain::Bsc, addr);
        assert!(!store.mark(&a));
        assert!(store.mark(&a_lower));
        assert!(!store.mark(&b));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (clock, store) = store();
        store.mark(&key("old"));
        clock.advance(chrono::Duration::hours(12));
        store.mark(&key("new"));
        clock.advance(chrono::Duration::hours(13));

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&key("new")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_single_winner() {
        let store = Arc::new(MemoryDedupStore::default());
        let k = key("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr");
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                let k = k.clone();
                tokio::spawn(async move { store.check_and_mark(&k).await })
            })
            .collect();
        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let store = Arc::new(MemoryDedupStore::default());
        let token = CancellationToken::new();
        let handle = store.clone().spawn_sweeper(Duration::from_secs(1), token.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
