pub mod config;
pub mod error;
pub mod prompt;
pub mod types;

pub use config::MediPalConfig;
pub use error::{MediPalError, Result};
pub use prompt::SYSTEM_INSTRUCTION;
pub use types::*;
