//! Storage abstraction trait
//!
//! This module defines the Storage trait the engine uses for every physical
//! file operation. Paths are absolute and must lie under the storage root.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use rma_attach_core::AppError;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Move failed: {0}")]
    MoveFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte source for uploads.
pub type UploadReader = Pin<Box<dyn AsyncRead + Send + Sync + Unpin>>;

/// Chunked byte stream for downloads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(format!("File not found: {}", path)),
            StorageError::AlreadyExists(path) => {
                AppError::Conflict(format!("File already exists: {}", path))
            }
            StorageError::InvalidPath(msg) => AppError::InvalidInput(msg),
            StorageError::TooLarge { limit } => AppError::PayloadTooLarge(format!(
                "File exceeds the maximum size of {} bytes",
                limit
            )),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// The engine only talks to the filesystem through this trait so that the
/// ordering discipline (write-then-record, move-then-update) can be exercised
/// against failing backends in tests.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Root directory every path must live under.
    fn root(&self) -> &Path;

    /// Create a directory (and parents) if absent.
    async fn ensure_dir(&self, dir: &Path) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, path: &Path) -> StorageResult<bool>;

    /// Write the reader's bytes to `path`, replacing any existing file.
    ///
    /// Bytes are staged next to the target and renamed into place, so a failed
    /// write never leaves a truncated target behind. Returns the byte count.
    /// Fails with `TooLarge` (and writes nothing) when `max_bytes` is exceeded.
    async fn write_stream(
        &self,
        path: &Path,
        reader: UploadReader,
        max_bytes: Option<u64>,
    ) -> StorageResult<u64>;

    /// Delete a file. A missing file is not an error.
    async fn delete(&self, path: &Path) -> StorageResult<()>;

    /// Move a file, creating the destination directory. Fails with
    /// `AlreadyExists` if the destination is taken; nothing remains at `from`
    /// on success.
    async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Copy a file, replacing the destination.
    async fn copy(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Get the size in bytes of a file.
    async fn content_length(&self, path: &Path) -> StorageResult<u64>;

    /// Names of the regular files directly inside `dir` (empty if `dir` is absent).
    async fn list_files(&self, dir: &Path) -> StorageResult<Vec<String>>;

    /// Read a file as a stream of chunks.
    async fn download_stream(&self, path: &Path) -> StorageResult<ByteStream>;

    /// A sibling path for temporary bytes belonging to `path`.
    fn sibling_temp_path(&self, path: &Path, tag: &str) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_name = format!(".{}.{}.{}", name, uuid::Uuid::new_v4().simple(), tag);
        match path.parent() {
            Some(parent) => parent.join(temp_name),
            None => PathBuf::from(temp_name),
        }
    }
}
