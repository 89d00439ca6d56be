use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::prompt::SYSTEM_INSTRUCTION;

/// Top-level configuration for the MediPal application.
///
/// Loaded from `~/.medipal/config.toml` by default. Each section corresponds
/// to one layer of the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediPalConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl MediPalConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MediPalConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite history database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.medipal/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Data directory with a leading `~` expanded to the home directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

/// Remote model and credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Gemini model identifier.
    pub model: String,
    /// Base URL of the Generative Language API.
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Fallback API key used when the environment variable is unset.
    pub api_key: String,
    /// Overrides the built-in MediPal system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "API_KEY".to_string(),
            api_key: String::new(),
            system_instruction: None,
        }
    }
}

impl AssistantConfig {
    /// The system instruction every new session is bound to.
    pub fn system_instruction(&self) -> &str {
        match self.system_instruction.as_deref() {
            Some(custom) if !custom.trim().is_empty() => custom,
            _ => SYSTEM_INSTRUCTION,
        }
    }
}

/// Where chat history is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite file in the data directory.
    #[default]
    Sqlite,
    /// Process memory; history is lost on exit.
    Memory,
    /// No storage at all.
    None,
}

/// History persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key under which the history snapshot is stored.
    pub history_key: String,
    /// Database file name inside the data directory.
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            history_key: "chatHistory".to_string(),
            db_file: "medipal.db".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port bound on 127.0.0.1.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3030 }
    }
}

/// Expand `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediPalError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_default_values() {
        let config = MediPalConfig::default();

        assert_eq!(config.general.data_dir, "~/.medipal/data");
        assert_eq!(config.general.log_level, "info");

        assert_eq!(config.assistant.model, "gemini-2.5-flash");
        assert_eq!(config.assistant.api_key_env, "API_KEY");
        assert!(config.assistant.api_key.is_empty());
        assert!(config.assistant.system_instruction.is_none());

        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.history_key, "chatHistory");
        assert_eq!(config.storage.db_file, "medipal.db");

        assert_eq!(config.server.port, 3030);
    }

    #[test]
    fn test_config_load_from_toml() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"

[assistant]
model = "gemini-2.5-pro"
api_key_env = "GEMINI_API_KEY"

[storage]
backend = "memory"
history_key = "history"

[server]
port = 8080
"#;
        let file = create_temp_config(content);
        let config = MediPalConfig::load(file.path()).unwrap();

        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.assistant.model, "gemini-2.5-pro");
        assert_eq!(config.assistant.api_key_env, "GEMINI_API_KEY");
        // Unspecified fields keep their defaults.
        assert_eq!(
            config.assistant.api_base,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.history_key, "history");
        assert_eq!(config.storage.db_file, "medipal.db");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = MediPalConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "~/.medipal/data");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = MediPalConfig::load(file.path());
        assert!(matches!(result, Err(MediPalError::Config(_))));
    }

    #[test]
    fn test_config_unknown_backend_rejected() {
        let file = create_temp_config("[storage]\nbackend = \"redis\"\n");
        assert!(MediPalConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_system_instruction_override() {
        let mut assistant = AssistantConfig::default();
        assert_eq!(assistant.system_instruction(), SYSTEM_INSTRUCTION);

        assistant.system_instruction = Some("   ".to_string());
        assert_eq!(assistant.system_instruction(), SYSTEM_INSTRUCTION);

        assistant.system_instruction = Some("Be brief.".to_string());
        assert_eq!(assistant.system_instruction(), "Be brief.");
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/lib/medipal"), PathBuf::from("/var/lib/medipal"));
        assert!(expand_home("~/.medipal/data").ends_with(".medipal/data"));
    }
}
