//! RMA attachment storage library
//!
//! Filesystem access for the attachment engine: the `Storage` trait, the local
//! (shared mount) implementation, and the path layout every attachment lives
//! under.
//!
//! # Directory layout
//!
//! - record-level: `{root}/RECORD_{record_id}/{category_key}/{file_name}`
//! - sub-scope:    `{root}/RECORD_{record_id}/SUB_{sub_scope_id}/{category_key}/{file_name}`
//!
//! The layout is part of the public contract: external tooling browses it
//! directly. Path generation is centralized in the `layout` module.

pub mod layout;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use layout::{LayoutError, PathResolver};
pub use local::LocalStorage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult, UploadReader};
