//! RMA attachment HTTP API
//!
//! axum handlers over the attachment services, the application state, and
//! server setup.

pub mod actor;
pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
