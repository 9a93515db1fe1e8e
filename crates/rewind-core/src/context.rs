//! Versioned shared context visible to every agent in a session.
//!
//! All operations take one mutex for their duration. There is no multi-call
//! atomicity: a `get` followed by a `set` is two independent operations, and
//! concurrent writers to the same key resolve last-writer-wins.
//!
//! Every `set`/`update` bumps the version by one and appends a history
//! record. `clear` bumps the version but appends no record. History is a
//! ring buffer capped at construction; trimming never affects the version.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::DEFAULT_CONTEXT_HISTORY_CAP;
use crate::messages::Payload;

/// Mutation recorded in the context history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Set,
    Update,
}

/// One record per mutating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Version after the mutation.
    pub version: u64,
    pub action: HistoryAction,
    pub keys: Vec<String>,
    /// Agent (or orchestrator) that performed the write, if known.
    pub writer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ContextState {
    values: Payload,
    version: u64,
    history: VecDeque<HistoryEntry>,
}

/// Shared key/value store with a version counter and bounded history.
#[derive(Debug)]
pub struct ContextStore {
    state: Mutex<ContextState>,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    history_cap: usize,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_CONTEXT_HISTORY_CAP)
    }

    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            history_cap,
        }
    }

    // A panic while holding the lock cannot leave the map half-written, so a
    // poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a single value.
    pub fn set(&self, key: impl Into<String>, value: Value, writer: Option<&str>) {
        let key = key.into();
        let mut state = self.lock();
        state.values.insert(key.clone(), value);
        self.record(&mut state, HistoryAction::Set, vec![key], writer);
    }

    /// Merge several values in one mutation.
    pub fn update(&self, updates: Payload, writer: Option<&str>) {
        let keys: Vec<String> = updates.keys().cloned().collect();
        let mut state = self.lock();
        state.values.extend(updates);
        self.record(&mut state, HistoryAction::Update, keys, writer);
    }

    fn record(
        &self,
        state: &mut ContextState,
        action: HistoryAction,
        keys: Vec<String>,
        writer: Option<&str>,
    ) {
        state.version += 1;
        let entry = HistoryEntry {
            version: state.version,
            action,
            keys,
            writer: writer.map(str::to_string),
            timestamp: Utc::now(),
        };
        state.history.push_back(entry);
        while state.history.len() > self.history_cap {
            state.history.pop_front();
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    /// Snapshot copy of every entry.
    pub fn get_all(&self) -> Payload {
        self.lock().values.clone()
    }

    /// Drop every entry and bump the version. No history record is written.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.values.clear();
        state.version += 1;
    }

    pub fn get_version(&self) -> u64 {
        self.lock().version
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Retained history, oldest first.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values.is_empty()
    }

    /// Store an agent's labeled output under `agent_result:{agent}:{task}`.
    pub fn cache_result(&self, agent_name: &str, task: &str, result: Value) {
        let entry = json!({
            "result": result,
            "agent": agent_name,
            "task": task,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.set(cache_key(agent_name, task), entry, Some(agent_name));
    }

    pub fn get_cached_result(&self, agent_name: &str, task: &str) -> Option<Value> {
        self.get(&cache_key(agent_name, task))
            .and_then(|cached| cached.get("result").cloned())
    }
}

/// Context key used by [`ContextStore::cache_result`].
pub fn cache_key(agent_name: &str, task: &str) -> String {
    format!("agent_result:{agent_name}:{task}")
}
