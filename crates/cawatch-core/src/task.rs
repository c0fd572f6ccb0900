//! Monitoring task model.

use crate::{Chain, CoreError, CoreResult, FilterConfig, TimeWindow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a push target is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Text only.
    DirectMessage,
    /// Full caption plus chart summary.
    Broadcast,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectMessage => write!(f, "direct_message"),
            Self::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Notification destination: numeric chat id or `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushTarget {
    pub chat: String,
    pub kind: TargetKind,
}

impl PushTarget {
    pub fn direct(chat: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            kind: TargetKind::DirectMessage,
        }
    }

    pub fn broadcast(chat: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            kind: TargetKind::Broadcast,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_evm_chain() -> Chain {
    Chain::Bsc
}

/// A monitoring task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub listen_chats: Vec<i64>,
    #[serde(default)]
    pub push_targets: Vec<PushTarget>,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scheduled re-check interval. `None` means event-driven only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recheck_interval_secs: Option<u64>,
    /// Chain assumed for `0x` addresses.
    #[serde(default = "default_evm_chain")]
    pub evm_chain: Chain,
    /// Addresses always covered by scheduled re-checks.
    #[serde(default)]
    pub watch_addresses: Vec<(Chain, String)>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        let id = TaskId::new(id);
        Self {
            name: id.0.clone(),
            id,
            listen_chats: Vec::new(),
            push_targets: Vec::new(),
            filters: FilterConfig::default(),
            window: None,
            enabled: true,
            recheck_interval_secs: None,
            evm_chain: default_evm_chain(),
            watch_addresses: Vec::new(),
        }
    }

    pub fn listens_on(&self, chat_id: i64) -> bool {
        self.listen_chats.contains(&chat_id)
    }

    /// Validate filters, window and EVM chain before commit.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.0.trim().is_empty() {
            return Err(CoreError::InvalidTask("empty task id".to_string()));
        }
        if !self.evm_chain.is_evm() {
            return Err(CoreError::InvalidTask(format!(
                "evm_chain must be an EVM chain, got {}",
                self.evm_chain
            )));
        }
        if self.recheck_interval_secs == Some(0) {
            return Err(CoreError::InvalidTask("recheck_interval_secs must be > 0".to_string()));
        }
        self.filters.validate()?;
        if let Some(window) = &self.window {
            window.validate()?;
        }
        Ok(())
    }
}

/// Dedup key `(task, chain, address)`.
///
/// EVM addresses are lower-cased; base58 addresses are case-significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub task: TaskId,
    pub chain: Chain,
    pub address: String,
}

impl DedupKey {
    pub fn new(task: TaskId, chain: Chain, address: &str) -> Self {
        let address = if chain.is_evm() {
            address.to_ascii_lowercase()
        } else {
            address.to_string()
        };
        Self {
            task,
            chain,
            address,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.task, self.chain, self.address)
    }
}
