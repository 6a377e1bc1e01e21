//! Session scratchpad: conversation history plus free-form context.
//!
//! One `Scratchpad` per user session. The dispatcher snapshots it before a
//! turn and appends the exchange only after the turn succeeds.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Situational context handed to agents (insertion ordered)
pub type Context = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug)]
pub struct Scratchpad {
    session_id: Uuid,
    history: RwLock<Vec<HistoryEntry>>,
    context: RwLock<Context>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4())
    }

    pub fn with_session_id(session_id: Uuid) -> Self {
        Self {
            session_id,
            history: RwLock::new(Vec::new()),
            context: RwLock::new(Context::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Copy of the full history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().clone()
    }

    pub fn context(&self) -> Context {
        self.context.read().clone()
    }

    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }

    pub fn append(&self, entry: HistoryEntry) {
        self.history.write().push(entry);
    }

    /// Append a completed exchange under a single lock
    pub fn append_turn(&self, user: impl Into<String>, assistant: impl Into<String>) {
        let mut history = self.history.write();
        history.push(HistoryEntry::user(user));
        history.push(HistoryEntry::assistant(assistant));
    }

    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.context.write().insert(key.into(), value);
    }

    pub fn remove_context(&self, key: &str) -> Option<Value> {
        self.context.write().shift_remove(key)
    }

    pub fn clear(&self) {
        self.history.write().clear();
        self.context.write().clear();
    }
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new()
    }
}

/// Isolated scratchpads keyed by session id
#[derive(Clone, Default)]
pub struct ScratchpadStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Scratchpad>>>>,
}

impl ScratchpadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh session
    pub fn create(&self) -> Arc<Scratchpad> {
        let pad = Arc::new(Scratchpad::new());
        self.sessions.write().insert(pad.session_id(), pad.clone());
        pad
    }

    pub fn get_or_create(&self, session_id: Uuid) -> Arc<Scratchpad> {
        if let Some(pad) = self.sessions.read().get(&session_id) {
            return pad.clone();
        }
        self.sessions
            .write()
            .entry(session_id)
            .or_insert_with(|| Arc::new(Scratchpad::with_session_id(session_id)))
            .clone()
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<Scratchpad>> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// End a session, dropping its scratchpad
    pub fn remove(&self, session_id: Uuid) -> Option<Arc<Scratchpad>> {
        self.sessions.write().remove(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
