//! Task configuration store.
//!
//! Readers take an immutable `Arc` snapshot; writers build a new map and swap
//! it in, so no reader ever sees a partially applied commit. Every commit
//! bumps a version published on a `watch` channel.
//!
//! Each stored id also carries a generation. It is assigned when the id
//! enters the store and survives edits, so a task that is removed and added
//! back under the same id reads as a different task.

use crate::error::{PersistenceError, PersistenceResult};
use cawatch_core::{Task, TaskId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub type TaskMap = BTreeMap<TaskId, Task>;
pub type TaskSnapshot = Arc<TaskMap>;
pub type TaskGenerations = Arc<BTreeMap<TaskId, u64>>;

/// Authoritative task configuration.
pub trait TaskStore: Send + Sync {
    /// Consistent view of all tasks.
    fn snapshot(&self) -> TaskSnapshot {
        self.snapshot_with_generations().0
    }

    /// Tasks and their generations, read from the same commit.
    fn snapshot_with_generations(&self) -> (TaskSnapshot, TaskGenerations);

    fn generation(&self, id: &TaskId) -> Option<u64> {
        self.snapshot_with_generations().1.get(id).copied()
    }

    fn get(&self, id: &TaskId) -> Option<Task> {
        self.snapshot().get(id).cloned()
    }

    /// Insert or replace a task after validation.
    fn upsert(&self, task: Task) -> PersistenceResult<()>;

    /// Returns `true` if the task existed.
    fn remove(&self, id: &TaskId) -> PersistenceResult<bool>;

    fn set_enabled(&self, id: &TaskId, enabled: bool) -> PersistenceResult<()>;

    /// Receives the commit version after every change.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

pub type DynTaskStore = Arc<dyn TaskStore>;

struct StoreState {
    tasks: TaskSnapshot,
    generations: TaskGenerations,
    last_generation: u64,
}

impl StoreState {
    fn new(map: TaskMap) -> Self {
        let mut state = Self {
            tasks: Arc::new(TaskMap::new()),
            generations: Arc::new(BTreeMap::new()),
            last_generation: 0,
        };
        state.install(map);
        state
    }

    /// Swap in `next`, keeping generations of surviving ids and assigning
    /// fresh ones to ids that were absent.
    fn install(&mut self, next: TaskMap) {
        let mut generations: BTreeMap<TaskId, u64> = self
            .generations
            .iter()
            .filter(|(id, _)| next.contains_key(*id))
            .map(|(id, g)| (id.clone(), *g))
            .collect();
        for id in next.keys() {
            if !generations.contains_key(id) {
                self.last_generation += 1;
                generations.insert(id.clone(), self.last_generation);
            }
        }
        self.generations = Arc::new(generations);
        self.tasks = Arc::new(next);
    }
}

/// In-memory store.
pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
    version: watch::Sender<u64>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::from_map(TaskMap::new())
    }

    /// Seed with tasks, validating each.
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> PersistenceResult<Self> {
        let mut map = TaskMap::new();
        for task in tasks {
            task.validate()?;
            map.insert(task.id.clone(), task);
        }
        Ok(Self::from_map(map))
    }

    fn from_map(map: TaskMap) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::new(map)),
            version,
        }
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Apply `mutate` to a copy of the map, run `persist` on the result, then
    /// publish. The write lock is held throughout so commits serialize.
    fn commit<R>(
        &self,
        mutate: impl FnOnce(&mut TaskMap) -> PersistenceResult<R>,
        persist: impl FnOnce(&TaskMap) -> PersistenceResult<()>,
    ) -> PersistenceResult<R> {
        let mut guard = self.state.write();
        let mut next = TaskMap::clone(&guard.tasks);
        let result = mutate(&mut next)?;
        persist(&next)?;
        guard.install(next);
        drop(guard);
        self.version.send_modify(|v| *v += 1);
        Ok(result)
    }

    fn upsert_with(
        &self,
        task: Task,
        persist: impl FnOnce(&TaskMap) -> PersistenceResult<()>,
    ) -> PersistenceResult<()> {
        task.validate()?;
        let id = task.id.clone();
        self.commit(
            |map| {
                map.insert(task.id.clone(), task);
                Ok(())
            },
            persist,
        )?;
        info!(task_id = %id, "Task committed");
        Ok(())
    }

    fn remove_with(
        &self,
        id: &TaskId,
        persist: impl FnOnce(&TaskMap) -> PersistenceResult<()>,
    ) -> PersistenceResult<bool> {
        if !self.state.read().tasks.contains_key(id) {
            return Ok(false);
        }
        let removed = self.commit(|map| Ok(map.remove(id).is_some()), persist)?;
        info!(task_id = %id, "Task removed");
        Ok(removed)
    }

    fn set_enabled_with(
        &self,
        id: &TaskId,
        enabled: bool,
        persist: impl FnOnce(&TaskMap) -> PersistenceResult<()>,
    ) -> PersistenceResult<()> {
        self.commit(
            |map| {
                let task = map
                    .get_mut(id)
                    .ok_or_else(|| PersistenceError::TaskNotFound(id.clone()))?;
                task.enabled = enabled;
                Ok(())
            },
            persist,
        )?;
        info!(task_id = %id, enabled, "Task enabled flag changed");
        Ok(())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn no_persist(_: &TaskMap) -> PersistenceResult<()> {
    Ok(())
}

impl TaskStore for InMemoryTaskStore {
    fn snapshot(&self) -> TaskSnapshot {
        self.state.read().tasks.clone()
    }

    fn snapshot_with_generations(&self) -> (TaskSnapshot, TaskGenerations) {
        let state = self.state.read();
        (state.tasks.clone(), state.generations.clone())
    }

    fn upsert(&self, task: Task) -> PersistenceResult<()> {
        self.upsert_with(task, no_persist)
    }

    fn remove(&self, id: &TaskId) -> PersistenceResult<bool> {
        self.remove_with(id, no_persist)
    }

    fn set_enabled(&self, id: &TaskId, enabled: bool) -> PersistenceResult<()> {
        self.set_enabled_with(id, enabled, no_persist)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

/// Store persisted as a JSON array of tasks.
///
/// Each commit rewrites the whole file through a temp file and rename.
pub struct JsonFileTaskStore {
    inner: InMemoryTaskStore,
    path: PathBuf,
}

impl JsonFileTaskStore {
    /// Load `path`, or start empty if it does not exist. An unreadable or
    /// invalid file is an error.
    pub fn open(path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let path = path.into();
        let tasks = if path.exists() {
            load_tasks(&path)?
        } else {
            info!(path = %path.display(), "Task file not found, starting empty");
            Vec::new()
        };
        let count = tasks.len();
        let inner = InMemoryTaskStore::with_tasks(tasks).map_err(|e| PersistenceError::CorruptTaskFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), tasks = count, "Task store loaded");
        Ok(Self { inner, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> impl FnOnce(&TaskMap) -> PersistenceResult<()> + '_ {
        move |map| write_tasks(&self.path, map)
    }
}

impl TaskStore for JsonFileTaskStore {
    fn snapshot(&self) -> TaskSnapshot {
        self.inner.snapshot()
    }

    fn snapshot_with_generations(&self) -> (TaskSnapshot, TaskGenerations) {
        self.inner.snapshot_with_generations()
    }

    fn upsert(&self, task: Task) -> PersistenceResult<()> {
        self.inner.upsert_with(task, self.persist())
    }

    fn remove(&self, id: &TaskId) -> PersistenceResult<bool> {
        self.inner.remove_with(id, self.persist())
    }

    fn set_enabled(&self, id: &TaskId, enabled: bool) -> PersistenceResult<()> {
        self.inner.set_enabled_with(id, enabled, self.persist())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }
}

fn load_tasks(path: &Path) -> PersistenceResult<Vec<Task>> {
    let raw = fs::read_to_string(path)?;
    let tasks: Vec<Task> = serde_json::from_str(&raw).map_err(|e| PersistenceError::CorruptTaskFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut seen = std::collections::BTreeSet::new();
    for task in &tasks {
        if !seen.insert(&task.id) {
            return Err(PersistenceError::CorruptTaskFile {
                path: path.display().to_string(),
                reason: format!("duplicate task id {}", task.id),
            });
        }
    }
    Ok(tasks)
}

fn write_tasks(path: &Path, map: &TaskMap) -> PersistenceResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tasks: Vec<&Task> = map.values().collect();
    let body = serde_json::to_vec_pretty(&tasks)?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), tasks = tasks.len(), "Task file written");
    Ok(())
}
