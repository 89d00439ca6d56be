use thiserror::Error;

/// Top-level error type for the MediPal ambient layers.
///
/// Configuration, storage and server failures surface here. The chat crate
/// defines its own `ChatError` for the session taxonomy and converts from
/// this type so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MediPalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MediPalError {
    fn from(err: toml::de::Error) -> Self {
        MediPalError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MediPalError {
    fn from(err: serde_json::Error) -> Self {
        MediPalError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for MediPal operations.
pub type Result<T> = std::result::Result<T, MediPalError>;
