//! MediPal Storage crate - persistent key-value store and history snapshots.
//!
//! Provides a WAL-mode SQLite database with migrations, the `KeyValueStore`
//! abstraction with SQLite, in-memory and no-op implementations, and the
//! `HistoryStore` that persists the chat history under a fixed key.

pub mod db;
pub mod history;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use history::{HistoryStore, HISTORY_KEY};
pub use store::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
