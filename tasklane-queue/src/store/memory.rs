//! In-process store.
//!
//! Mirrors the Redis data model closely enough to run the full protocol:
//! every write bumps a per-key version, a session remembers the versions it
//! watched, and `exec` refuses to apply anything if one of them moved.
//! Empty lists, sets and hashes disappear the way Redis keys do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::{Op, StoreSession, TaskStore, Transaction};
use crate::error::QueueResult;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    versions: HashMap<String, u64>,
    next_version: u64,
}

impl State {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.next_version += 1;
        self.versions.insert(key.to_string(), self.next_version);
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::HashSet { key, fields } => {
                self.hashes.entry(key.clone()).or_default().extend(fields);
                self.touch(&key);
            }
            Op::ListPush { key, value } => {
                self.lists.entry(key.clone()).or_default().push_back(value);
                self.touch(&key);
            }
            Op::ListPopFront { key } => {
                if let Some(list) = self.lists.get_mut(&key) {
                    list.pop_front();
                    if list.is_empty() {
                        self.lists.remove(&key);
                    }
                    self.touch(&key);
                }
            }
            Op::ListRemove { key, value } => {
                if let Some(list) = self.lists.get_mut(&key)
                    && let Some(pos) = list.iter().position(|v| *v == value)
                {
                    list.remove(pos);
                    if list.is_empty() {
                        self.lists.remove(&key);
                    }
                    self.touch(&key);
                }
            }
            Op::SetAdd { key, member } => {
                if self.sets.entry(key.clone()).or_default().insert(member) {
                    self.touch(&key);
                }
            }
            Op::SetRemove { key, member } => {
                if let Some(set) = self.sets.get_mut(&key)
                    && set.remove(&member)
                {
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                    self.touch(&key);
                }
            }
        }
    }
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Clock,
}

impl MemoryStore {
    /// Store whose clock is the system wall clock.
    pub fn new() -> Self {
        Self::with_clock(|| chrono::Utc::now().timestamp())
    }

    /// Store with an injected clock, in epoch seconds.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock: Arc::new(clock),
        }
    }

    /// Delete a key of any type, as an external client might.
    pub fn remove_key(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.hashes.remove(key).is_some()
            | state.lists.remove(key).is_some()
            | state.sets.remove(key).is_some();
        if removed {
            state.touch(key);
        }
        removed
    }

    /// Apply writes outside any session, as an external client might.
    pub fn apply(&self, tx: Transaction) {
        let mut state = self.state.lock();
        for op in tx.into_ops() {
            state.apply(op);
        }
    }

    /// Keys currently holding data, sorted.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: Vec<String> = state
            .hashes
            .keys()
            .chain(state.lists.keys())
            .chain(state.sets.keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.keys().len())
            .finish()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn session(&self) -> QueueResult<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
            watched: HashMap::new(),
        }))
    }
}

struct MemorySession {
    store: MemoryStore,
    watched: HashMap<String, u64>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn watch(&mut self, key: &str) -> QueueResult<()> {
        let version = self.store.state.lock().version(key);
        self.watched.entry(key.to_string()).or_insert(version);
        Ok(())
    }

    async fn unwatch(&mut self) -> QueueResult<()> {
        self.watched.clear();
        Ok(())
    }

    async fn list_range(&mut self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let state = self.store.state.lock();
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .range(start as usize..=stop as usize)
            .cloned()
            .collect())
    }

    async fn list_len(&mut self, key: &str) -> QueueResult<usize> {
        Ok(self.store.state.lock().lists.get(key).map_or(0, VecDeque::len))
    }

    async fn hash_get_all(&mut self, key: &str) -> QueueResult<HashMap<String, String>> {
        Ok(self
            .store
            .state
            .lock()
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> QueueResult<bool> {
        Ok(self
            .store
            .state
            .lock()
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&mut self, key: &str) -> QueueResult<Vec<String>> {
        Ok(self
            .store
            .state
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_len(&mut self, key: &str) -> QueueResult<usize> {
        Ok(self.store.state.lock().sets.get(key).map_or(0, HashSet::len))
    }

    async fn server_time(&mut self) -> QueueResult<i64> {
        Ok((self.store.clock)())
    }

    async fn exec(&mut self, tx: Transaction) -> QueueResult<bool> {
        let watched = std::mem::take(&mut self.watched);
        let mut state = self.store.state.lock();

        if watched
            .iter()
            .any(|(key, version)| state.version(key) != *version)
        {
            return Ok(false);
        }

        for op in tx.into_ops() {
            state.apply(op);
        }
        Ok(true)
    }
}
