//! Upload orchestration
//!
//! Order of operations for every file: bytes are written first and the
//! tracking row second. When the row write fails the bytes are removed (or,
//! for an overwrite, the previous bytes restored) and the file reports a
//! `DatabaseError`.

pub mod service;
pub mod types;

pub use service::UploadService;
pub use types::{
    ConflictStrategy, FileOutcome, StoredFile, UploadFile, UploadOutcome, UploadRequest,
};
