//! Error types module
//!
//! All engine errors are unified under the `AppError` enum, which can represent
//! database, storage, validation, conflict and authorization failures. The
//! `ErrorMetadata` trait lets the HTTP layer present an error without matching
//! on every variant itself.
//!
//! The `Database` variant carries a `sqlx::Error` only when the `sqlx` feature is
//! enabled; without it the variant holds a message.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Level a failed request is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like validation failures
    Debug,
    /// Recoverable issues like conflicts
    Warn,
    /// Unexpected failures
    Error,
}

/// How an error is presented to HTTP clients and to the logs.
pub trait ErrorMetadata {
    fn http_status_code(&self) -> u16;

    /// Stable code clients can match on, e.g. `CONFLICT`.
    fn error_code(&self) -> &'static str;

    /// True when retrying the same request may succeed.
    fn is_recoverable(&self) -> bool;

    /// Message safe to show a caller.
    fn client_message(&self) -> String;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => (500, "DATABASE_ERROR", true, LogLevel::Error),
        AppError::Storage(_) => (500, "STORAGE_ERROR", true, LogLevel::Error),
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::Conflict(_) => (409, "CONFLICT", false, LogLevel::Warn),
        AppError::Forbidden(_) => (403, "FORBIDDEN", false, LogLevel::Debug),
        AppError::Unauthorized(_) => (401, "UNAUTHORIZED", false, LogLevel::Debug),
        AppError::PayloadTooLarge(_) => (413, "PAYLOAD_TOO_LARGE", false, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Whether the failure happened in the tracking store rather than on disk.
    pub fn is_database(&self) -> bool {
        matches!(self, AppError::Database(_))
    }

    /// The error followed by up to five `Caused by` lines.
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::InvalidInput(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Forbidden(msg)
            | AppError::Unauthorized(msg)
            | AppError::PayloadTooLarge(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert!(err.is_database());
        assert_eq!(err.client_message(), "Failed to access database");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_error_metadata_conflict() {
        let err = AppError::Conflict("report.txt already exists".to_string());
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(err.error_code(), "CONFLICT");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "report.txt already exists");
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err = AppError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(!err.is_database());
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("disk full").context("writing archive"));
        let details = err.detailed_message();
        assert!(details.contains("Internal error with source"));
        assert!(details.contains("writing archive"));
    }
}
