//! Contract of the remote chat endpoint.
//!
//! An endpoint hands out sessions; a session is a remote conversation bound
//! to a system instruction that streams a reply for each user turn.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ChatError;

/// An incremental piece of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyChunk {
    pub text: String,
}

impl ReplyChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Finite, non-restartable stream of reply chunks.
///
/// Any item may be an error, after which the stream yields nothing useful.
pub type ReplyStream = BoxStream<'static, Result<ReplyChunk, ChatError>>;

/// Everything needed to open a session.
#[derive(Clone)]
pub struct SessionConfig {
    pub api_key: String,
    pub system_instruction: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"<redacted>")
            .field("system_instruction_len", &self.system_instruction.len())
            .finish()
    }
}

/// A live remote conversation holding its own turn history.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one user turn and stream the model's reply.
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, ChatError>;
}

/// Factory of chat sessions.
pub trait ChatEndpoint: Send + Sync {
    /// Create a new session with empty turn history.
    fn create_session(&self, config: &SessionConfig) -> Result<Arc<dyn ChatSession>, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_debug_hides_key() {
        let config = SessionConfig {
            api_key: "secret-key".to_string(),
            system_instruction: "Be kind.".to_string(),
        };
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("redacted"));
    }
}
