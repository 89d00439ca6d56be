//! Chat history snapshot persistence.
//!
//! The full message sequence is stored as one JSON array under a fixed key.
//! An empty history is represented by the absence of the key, so "never
//! chatted" and "chat cleared" both read back as no entry. Storage failures
//! are logged and swallowed: the chat keeps working in memory.

use std::sync::Arc;

use tracing::{debug, warn};

use medipal_core::error::{MediPalError, Result};
use medipal_core::types::Message;

use crate::store::KeyValueStore;

/// Default key of the history snapshot.
pub const HISTORY_KEY: &str = "chatHistory";

/// Reads and writes the history snapshot in a [`KeyValueStore`].
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Store under [`HISTORY_KEY`].
    pub fn with_default_key(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, HISTORY_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted history.
    ///
    /// A missing, unreadable or corrupt snapshot yields an empty history.
    /// Bot messages that were still streaming when the snapshot was written
    /// are dropped, since their reply can never complete.
    pub fn load(&self) -> Vec<Message> {
        match self.try_load() {
            Ok(history) => history,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to load chat history, starting empty");
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<Message>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };
        let mut history = decode(&raw)?;
        let before = history.len();
        history.retain(|m| !m.pending);
        if history.len() != before {
            debug!(dropped = before - history.len(), "Dropped unfinished replies from snapshot");
        }
        Ok(history)
    }

    /// Persist `history`, or delete the snapshot when it is empty.
    pub fn save(&self, history: &[Message]) {
        if let Err(e) = self.try_save(history) {
            warn!(key = %self.key, error = %e, "Failed to persist chat history");
        }
    }

    fn try_save(&self, history: &[Message]) -> Result<()> {
        if history.is_empty() {
            return self.store.remove(&self.key);
        }
        self.store.set(&self.key, &encode(history)?)
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").field("key", &self.key).finish()
    }
}

/// Serialize a history snapshot.
pub fn encode(history: &[Message]) -> Result<String> {
    serde_json::to_string(history).map_err(MediPalError::from)
}

/// Deserialize a history snapshot.
pub fn decode(raw: &str) -> Result<Vec<Message>> {
    serde_json::from_str(raw).map_err(MediPalError::from)
}
