//! MediPal API crate - axum HTTP server, chat handlers, SSE state stream.
//!
//! Exposes the session manager to a browser presentation layer: read the
//! conversation, send a message, clear it, and follow state changes live.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
