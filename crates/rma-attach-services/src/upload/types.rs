use rma_attach_storage::UploadReader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What to do with a file whose name already exists at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Leave the existing file alone and drop the upload.
    Skip,
    /// Store under the first free `"name (n).ext"`.
    Rename,
    /// Replace the existing bytes and refresh the tracking row.
    Overwrite,
}

impl FromStr for ConflictStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(ConflictStrategy::Skip),
            "rename" => Ok(ConflictStrategy::Rename),
            "overwrite" => Ok(ConflictStrategy::Overwrite),
            _ => Err(anyhow::anyhow!("Unknown conflict strategy: {}", s)),
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictStrategy::Skip => write!(f, "skip"),
            ConflictStrategy::Rename => write!(f, "rename"),
            ConflictStrategy::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Where a batch goes and how conflicts are handled.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub record_id: i64,
    pub sub_scope_id: Option<i64>,
    pub category_key: String,
    pub strategy: Option<ConflictStrategy>,
}

/// One incoming file.
pub struct UploadFile {
    pub name: String,
    pub reader: UploadReader,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, reader: UploadReader) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(name, Box::pin(std::io::Cursor::new(data.into())))
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile").field("name", &self.name).finish()
    }
}

/// A file that ended up on disk and in the tracking store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub attachment_id: Uuid,
    /// Name on disk.
    pub file_name: String,
    /// Name as uploaded, when a rename was applied.
    pub original_name: Option<String>,
    pub size_bytes: u64,
    pub storage_path: String,
    pub display_path: String,
    pub overwritten: bool,
}

/// Result for one file of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Success(StoredFile),
    Skipped {
        file_name: String,
    },
    ValidationError {
        file_name: String,
        message: String,
    },
    /// The tracking write failed; the bytes written for it were removed.
    DatabaseError {
        file_name: String,
        message: String,
    },
    /// The batch could not continue; everything this call wrote was undone.
    GeneralError {
        file_name: Option<String>,
        message: String,
    },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success(_))
    }
}

/// Result of an upload call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// One result per input file, in input order (or a single `GeneralError`).
    Completed { results: Vec<FileOutcome> },
    /// Names already present at the destination while no strategy was
    /// given. Nothing was written.
    ConflictDetected { names: Vec<String> },
}
