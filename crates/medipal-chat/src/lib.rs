//! Conversation session management for MediPal.
//!
//! Provides the endpoint abstraction over the remote model, the Gemini
//! streaming client, credential lookup, and the `SessionManager` that owns
//! the history, streams replies into it and recovers from failures.

pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod gemini;
pub mod manager;
pub mod scripted;

pub use credentials::{CredentialSource, EnvCredential, StaticCredential};
pub use endpoint::{ChatEndpoint, ChatSession, ReplyChunk, ReplyStream, SessionConfig};
pub use error::ChatError;
pub use gemini::{GeminiEndpoint, DEFAULT_GEMINI_MODEL};
pub use manager::SessionManager;
pub use scripted::{LiveFeed, Script, ScriptedEndpoint};
