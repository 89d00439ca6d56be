//! Chat session manager: owns the conversation and drives the endpoint.
//!
//! The manager holds the message history, the loading and error flags, and
//! the live session handle. Every transition is applied under one lock,
//! persisted when the history changed, and published on a watch channel so
//! observers see each streamed chunk.
//!
//! `clear_chat` bumps an epoch counter. A reply stream captures the epoch
//! when it starts and drops itself as soon as the epoch moved on, so a stale
//! stream never writes into a conversation that has since been cleared.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use medipal_core::types::{ChatState, Message, MessageId};
use medipal_storage::HistoryStore;

use crate::credentials::CredentialSource;
use crate::endpoint::{ChatEndpoint, ChatSession, SessionConfig};
use crate::error::ChatError;

/// Owns one conversation with the remote assistant.
pub struct SessionManager {
    endpoint: Arc<dyn ChatEndpoint>,
    credentials: Arc<dyn CredentialSource>,
    history_store: HistoryStore,
    system_instruction: String,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ChatState>,
}

struct Inner {
    history: Vec<Message>,
    loading: bool,
    error: Option<String>,
    session: Option<Arc<dyn ChatSession>>,
    epoch: u64,
    /// History changed since it was last persisted.
    dirty: bool,
}

impl Inner {
    fn snapshot(&self) -> ChatState {
        ChatState {
            history: self.history.clone(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }

    fn push(&mut self, message: Message) {
        self.history.push(message);
        self.dirty = true;
    }

    /// Overwrite the text of a still-streaming message.
    fn set_text(&mut self, id: MessageId, text: &str) -> bool {
        match self.history.iter_mut().find(|m| m.id == id && m.pending) {
            Some(message) => {
                message.text = text.to_string();
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    fn finish(&mut self, id: MessageId) {
        if let Some(message) = self.history.iter_mut().find(|m| m.id == id) {
            message.pending = false;
            self.dirty = true;
        }
    }

    fn remove(&mut self, id: MessageId) {
        let before = self.history.len();
        self.history.retain(|m| m.id != id);
        if self.history.len() != before {
            self.dirty = true;
        }
    }

    fn clear(&mut self) {
        self.history.clear();
        self.dirty = true;
    }
}

impl SessionManager {
    /// Restore persisted history and try to open a session.
    ///
    /// Initialization failures are recorded in the published `error` and
    /// retried on the next send.
    pub fn new(
        endpoint: Arc<dyn ChatEndpoint>,
        credentials: Arc<dyn CredentialSource>,
        history_store: HistoryStore,
        system_instruction: impl Into<String>,
    ) -> Self {
        let history = history_store.load();
        info!(messages = history.len(), "Chat history restored");

        let inner = Inner {
            history,
            loading: false,
            error: None,
            session: None,
            epoch: 0,
            dirty: false,
        };
        let (state_tx, _) = watch::channel(inner.snapshot());

        let manager = Self {
            endpoint,
            credentials,
            history_store,
            system_instruction: system_instruction.into(),
            inner: Mutex::new(inner),
            state_tx,
        };

        manager.update(|inner| {
            if let Err(e) = manager.initialize(inner) {
                warn!(error = %e, "Chat session initialization failed");
                inner.error = Some(e.to_string());
            }
        });

        manager
    }

    /// Current published state.
    pub fn state(&self) -> ChatState {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state_tx.subscribe()
    }

    /// Whether a live session handle exists.
    pub fn is_initialized(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Send a user message and stream the reply into the history.
    ///
    /// Blank input is expected to be filtered out by the caller. Failures are
    /// published in the state's `error` and also returned. The caller should
    /// not start another send while `loading` is set.
    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        let (session, epoch) = self.update(|inner| self.begin_exchange(inner, text))?;

        let mut stream = match session.stream_reply(text).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_exchange(epoch, None, &e);
                return Err(e);
            }
        };

        let bot_id = self.update(|inner| {
            if inner.epoch != epoch {
                return None;
            }
            let placeholder = Message::placeholder();
            let id = placeholder.id;
            inner.push(placeholder);
            Some(id)
        });
        let Some(bot_id) = bot_id else {
            debug!("Conversation cleared before the reply started");
            return Err(ChatError::Superseded);
        };

        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) if chunk.text.is_empty() => {}
                Ok(chunk) => {
                    reply.push_str(&chunk.text);
                    let applied =
                        self.update(|inner| inner.epoch == epoch && inner.set_text(bot_id, &reply));
                    if !applied {
                        debug!(%bot_id, "Dropping reply for a cleared conversation");
                        return Err(ChatError::Superseded);
                    }
                    debug!(%bot_id, chunk_len = chunk.text.len(), "Reply chunk applied");
                }
                Err(e) => {
                    self.fail_exchange(epoch, Some(bot_id), &e);
                    return Err(e);
                }
            }
        }

        if reply.is_empty() {
            let e = ChatError::Stream("the model returned an empty response".to_string());
            self.fail_exchange(epoch, Some(bot_id), &e);
            return Err(e);
        }

        let completed = self.update(|inner| {
            if inner.epoch != epoch {
                return false;
            }
            inner.finish(bot_id);
            inner.loading = false;
            true
        });
        if !completed {
            return Err(ChatError::Superseded);
        }

        info!(%bot_id, reply_len = reply.len(), "Reply completed");
        Ok(())
    }

    /// Forget the conversation locally and remotely.
    ///
    /// Empties the history, deletes the snapshot, resets the flags and
    /// replaces the session handle with a fresh one.
    pub fn clear_chat(&self) {
        self.update(|inner| {
            inner.clear();
            inner.epoch += 1;
            inner.loading = false;
            inner.error = None;
            inner.session = None;
            if let Err(e) = self.initialize(inner) {
                warn!(error = %e, "Chat session re-initialization failed");
                inner.error = Some(e.to_string());
            }
        });
        info!("Chat cleared");
    }

    // -- Private helpers --

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Chat state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Apply a transition, persist the history if it changed, and publish.
    fn update<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.lock();
        let result = f(&mut inner);
        if inner.dirty {
            self.history_store.save(&inner.history);
            inner.dirty = false;
        }
        self.state_tx.send_replace(inner.snapshot());
        result
    }

    fn initialize(&self, inner: &mut Inner) -> Result<Arc<dyn ChatSession>, ChatError> {
        let api_key = self.credentials.api_key()?;
        let config = SessionConfig {
            api_key,
            system_instruction: self.system_instruction.clone(),
        };
        let session = self.endpoint.create_session(&config)?;
        inner.session = Some(Arc::clone(&session));
        info!("Chat session initialized");
        Ok(session)
    }

    fn begin_exchange(
        &self,
        inner: &mut Inner,
        text: &str,
    ) -> Result<(Arc<dyn ChatSession>, u64), ChatError> {
        let session = match inner.session.clone() {
            Some(session) => session,
            None => match self.initialize(inner) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Cannot send, chat session unavailable");
                    inner.error = Some(ChatError::NotInitialized.to_string());
                    return Err(ChatError::NotInitialized);
                }
            },
        };

        inner.push(Message::user(text));
        inner.loading = true;
        inner.error = None;
        Ok((session, inner.epoch))
    }

    fn fail_exchange(&self, epoch: u64, bot_id: Option<MessageId>, error: &ChatError) {
        warn!(error = %error, "Chat exchange failed");
        self.update(|inner| {
            if inner.epoch != epoch {
                return;
            }
            if let Some(id) = bot_id {
                inner.remove(id);
            }
            inner.error = Some(error.to_string());
            inner.loading = false;
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
