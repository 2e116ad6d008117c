//! RMA attachment core library
//!
//! Domain models, error types, configuration and input validation shared by
//! every crate of the attachment engine.

pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, DisplayAlias};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use identity::Actor;
