//! Error types for the chat session.

/// Errors from the chat session and its endpoint.
///
/// The `Display` text is what the presentation layer shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Initialization failed: {0} environment variable not set.")]
    MissingCredential(String),
    #[error("Initialization failed: {0}")]
    Init(String),
    #[error("Chat not initialized. Please check your API key.")]
    NotInitialized,
    #[error("Failed to get response: {0}")]
    Stream(String),
    #[error("conversation was cleared before the reply finished")]
    Superseded,
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Stream(err.to_string())
    }
}
