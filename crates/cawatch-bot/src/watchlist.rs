//! Per-task watchlist of addresses awaiting a re-check.
//!
//! Addresses seen in messages that did not notify (fetch or filter failure)
//! stay here until they notify, expire, or are evicted oldest-first when the
//! task's list is full.

use cawatch_core::{Chain, DedupKey, TaskId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct WatchEntry {
    key: DedupKey,
    chain: Chain,
    address: String,
    expires_at: DateTime<Utc>,
}

/// Bounded, TTL-expiring address list per task.
pub struct Watchlist {
    ttl: chrono::Duration,
    capacity: usize,
    entries: Mutex<HashMap<TaskId, VecDeque<WatchEntry>>>,
}

impl Watchlist {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Add an address unless already present. Returns `true` if added.
    ///
    /// An existing entry keeps its original expiry.
    pub fn observe(&self, task: &TaskId, chain: Chain, address: &str, now: DateTime<Utc>) -> bool {
        let key = DedupKey::new(task.clone(), chain, address);
        let mut entries = self.entries.lock();
        let list = entries.entry(task.clone()).or_default();
        list.retain(|e| e.expires_at > now);
        if list.iter().any(|e| e.key == key) {
            return false;
        }
        if list.len() >= self.capacity {
            if let Some(evicted) = list.pop_front() {
                debug!(task_id = %task, address = %evicted.address, "Watchlist full, evicting oldest");
            }
        }
        list.push_back(WatchEntry {
            key,
            chain,
            address: address.to_string(),
            expires_at: now + self.ttl,
        });
        true
    }

    pub fn remove(&self, task: &TaskId, chain: Chain, address: &str) -> bool {
        let key = DedupKey::new(task.clone(), chain, address);
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(task) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.key != key);
        before != list.len()
    }

    /// Unexpired addresses for `task`, oldest first.
    pub fn addresses(&self, task: &TaskId, now: DateTime<Utc>) -> Vec<(Chain, String)> {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(task) else {
            return Vec::new();
        };
        list.retain(|e| e.expires_at > now);
        list.iter().map(|e| (e.chain, e.address.clone())).collect()
    }

    pub fn drop_task(&self, task: &TaskId) {
        self.entries.lock().remove(task);
    }

    pub fn len(&self, task: &TaskId) -> usize {
        self.entries.lock().get(task).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, task: &TaskId) -> bool {
        self.len(task) == 0
    }
}
