//! API key lookup.
//!
//! The key is consulted on every initialization attempt, so fixing a missing
//! key takes effect on the next send without restarting.

use std::sync::RwLock;

use crate::error::ChatError;

/// Source of the endpoint API key.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> Result<String, ChatError>;
}

/// Reads the key from an environment variable, with an optional fallback
/// taken from the configuration file.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
    fallback: Option<String>,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            fallback: None,
        }
    }

    /// Use `key` when the variable is unset or blank. Blank keys are ignored.
    pub fn with_fallback(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.fallback = (!key.trim().is_empty()).then_some(key);
        self
    }
}

impl CredentialSource for EnvCredential {
    fn api_key(&self) -> Result<String, ChatError> {
        std::env::var(&self.var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| ChatError::MissingCredential(self.var.clone()))
    }
}

/// Key held in memory and replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticCredential {
    key: RwLock<Option<String>>,
}

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(Some(key.into())),
        }
    }

    /// A source with no key set.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>) {
        if let Ok(mut slot) = self.key.write() {
            *slot = Some(key.into());
        }
    }
}

impl CredentialSource for StaticCredential {
    fn api_key(&self) -> Result<String, ChatError> {
        self.key
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ChatError::MissingCredential("API_KEY".to_string()))
    }
}
