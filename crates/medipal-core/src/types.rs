use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed (or dictated) by the person using the assistant.
    User,
    /// Streamed back from the model.
    Bot,
}

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a chat message.
///
/// UUIDv7, so ids created later sort after ids created earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A single entry in the chat history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Set while a bot reply is still streaming into this message.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pending: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    /// A finalized message from the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
            pending: false,
        }
    }

    /// A finalized bot message.
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            ..Self::user(text)
        }
    }

    /// An empty bot message that streamed text will be written into.
    pub fn placeholder() -> Self {
        Self {
            pending: true,
            ..Self::bot(String::new())
        }
    }
}

// =============================================================================
// Published state
// =============================================================================

/// Everything a presentation layer needs to render the conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub history: Vec<Message>,
    /// True while a reply is being streamed; submission should be disabled.
    pub loading: bool,
    /// Last user-visible failure, cleared by the next successful mutation.
    pub error: Option<String>,
}
