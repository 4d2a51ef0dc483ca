//! In-memory conversational sessions
//!
//! Each [`SessionKey`] owns its own message history. A session can only be
//! driven by one invocation at a time: opening a key that is already in use
//! fails with a session setup error instead of interleaving two
//! conversations. All sessions of a run are dropped when the run closes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tradeflow_core::{Error, Result, RunId, SessionKey};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a session's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    history: Vec<ChatMessage>,
    in_use: bool,
}

/// Thread-safe store of live sessions
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, SessionState>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open (or create) the session for `key` for exclusive use
    pub fn open(&self, key: &SessionKey) -> Result<SessionLease<'_>> {
        let mut sessions = self.lock();
        let state = sessions.entry(key.clone()).or_default();
        if state.in_use {
            return Err(Error::SessionSetup {
                key: key.to_string(),
                reason: "session is already driven by another invocation".to_string(),
            });
        }
        state.in_use = true;

        Ok(SessionLease {
            store: self,
            key: key.clone(),
        })
    }

    /// Drop every session belonging to `run_id`, returning how many were removed
    pub fn close_run(&self, run_id: RunId) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|key, _| key.run_id() != run_id);
        before - sessions.len()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Exclusive access to one session; released on drop
#[derive(Debug)]
pub struct SessionLease<'a> {
    store: &'a SessionStore,
    key: SessionKey,
}

impl SessionLease<'_> {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Messages exchanged in this session so far
    pub fn history(&self) -> Vec<ChatMessage> {
        self.store
            .lock()
            .get(&self.key)
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }

    /// Append a completed exchange to the session
    pub fn record(&self, prompt: impl Into<String>, reply: impl Into<String>) {
        if let Some(state) = self.store.lock().get_mut(&self.key) {
            state.history.push(ChatMessage::user(prompt));
            state.history.push(ChatMessage::assistant(reply));
        }
    }
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.store.lock().get_mut(&self.key) {
            state.in_use = false;
        }
    }
}
