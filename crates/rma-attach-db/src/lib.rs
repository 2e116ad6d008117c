//! Database access layer for the attachment engine
//!
//! Repository traits live in `traits`; `db` holds the Postgres implementations
//! and, behind the `memory` feature, `memory` holds in-process ones used by
//! service and API tests.

pub mod db;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod traits;

pub use db::{
    AttachmentRepository, AuditLogRepository, CategoryRepository, RecordRepository,
    TempTokenRepository,
};
pub use traits::{AttachmentStore, AuditLogStore, CategoryProvider, TempTokenStore};
