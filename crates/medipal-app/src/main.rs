//! MediPal application binary - composition root.
//!
//! Ties the MediPal crates into a single executable:
//! 1. Parse the command line and load configuration from TOML
//! 2. Install logging
//! 3. Open the history store selected in the configuration
//! 4. Build the Gemini endpoint and the session manager
//! 5. Serve the HTTP API, or run the terminal chat

mod cli;
mod terminal;

use std::sync::Arc;

use clap::Parser;

use medipal_api::state::AppState;
use medipal_chat::{EnvCredential, GeminiEndpoint, SessionManager};
use medipal_core::config::{MediPalConfig, StorageBackend};
use medipal_core::MediPalError;
use medipal_storage::{Database, HistoryStore, KeyValueStore, MemoryStore, NoopStore, SqliteStore};

use cli::{CliArgs, Command};

/// Open the key-value store backing the chat history.
fn open_store(config: &MediPalConfig) -> Result<Arc<dyn KeyValueStore>, MediPalError> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let data_dir = config.general.resolved_data_dir();
            std::fs::create_dir_all(&data_dir)?;
            let db_path = data_dir.join(&config.storage.db_file);
            let db = Database::new(&db_path)?;
            tracing::info!(path = %db_path.display(), "SQLite database opened");
            Ok(Arc::new(SqliteStore::new(db)))
        }
        StorageBackend::Memory => {
            tracing::info!("Chat history kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::None => {
            tracing::info!("Chat history persistence disabled");
            Ok(Arc::new(NoopStore))
        }
    }
}

/// Build the session manager from configuration.
fn build_manager(config: &MediPalConfig, store: Arc<dyn KeyValueStore>) -> SessionManager {
    let assistant = &config.assistant;
    let endpoint = Arc::new(GeminiEndpoint::from_config(assistant));
    let credentials =
        Arc::new(EnvCredential::new(&assistant.api_key_env).with_fallback(&assistant.api_key));
    let history = HistoryStore::new(store, &config.storage.history_key);

    SessionManager::new(
        endpoint,
        credentials,
        history,
        assistant.system_instruction(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = MediPalConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => MediPalConfig::default(),
    };
    args.apply(&mut config);

    // Tracing. Logs go to stderr so they stay out of the terminal chat.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting MediPal v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    // Storage.
    let store = match open_store(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open history store");
            return Err(e.into());
        }
    };

    let manager = Arc::new(build_manager(&config, store));

    match args.command() {
        Command::Chat => terminal::run(&manager).await?,
        Command::Serve => {
            let state = AppState::new(config.clone(), Arc::clone(&manager));
            if let Err(e) = medipal_api::start_server(&config, state).await {
                tracing::error!(error = %e, "API server stopped");
                tracing::error!(
                    "Try: MEDIPAL_PORT={} medipal serve",
                    config.server.port.saturating_add(1)
                );
                return Err(e.into());
            }
        }
    }

    Ok(())
}
