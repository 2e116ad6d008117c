//! Repository trait abstractions
//!
//! The services depend on these traits rather than on concrete repositories so
//! the ordering and compensation logic can be tested without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rma_attach_core::models::{
    Attachment, AttachmentFilter, AttachmentLocation, AttachmentWithCategory, AuditLogEntry,
    Category, NewAttachment, NewAuditEntry, NewTempToken, ScopeLevel, TempToken,
};
use rma_attach_core::AppError;
use uuid::Uuid;

/// Tracking rows for attachments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// The active attachment stored at `storage_path`, if any.
    async fn find_active_by_path(&self, storage_path: &str)
        -> Result<Option<Attachment>, AppError>;

    /// An attachment by id, deleted or not.
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>, AppError>;

    /// Active attachments among `ids`, in the order given. Unknown or deleted
    /// ids are left out.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>, AppError>;

    async fn insert(&self, new: NewAttachment) -> Result<Attachment, AppError>;

    /// Refresh size, uploader and timestamp after the bytes were replaced.
    /// Identity and path are preserved.
    async fn record_overwrite(
        &self,
        id: Uuid,
        size_bytes: i64,
        uploaded_by: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Attachment, AppError>;

    /// Point an active attachment at a new location. Path, scope and category
    /// change together.
    async fn relocate(&self, id: Uuid, location: &AttachmentLocation)
        -> Result<Attachment, AppError>;

    /// Soft-delete the active attachment at `storage_path`. `None` when there
    /// was nothing active there.
    async fn soft_delete_by_path(
        &self,
        storage_path: &str,
        deleted_by: &str,
    ) -> Result<Option<Attachment>, AppError>;

    /// Active attachments matching the filter, ordered by file name.
    async fn list(&self, filter: &AttachmentFilter)
        -> Result<Vec<AttachmentWithCategory>, AppError>;
}

/// Append-only audit ledger.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AppError>;

    /// Entries for one attachment, newest first.
    async fn list_for_attachment(&self, attachment_id: Uuid)
        -> Result<Vec<AuditLogEntry>, AppError>;
}

/// Persistence for temporary download tokens.
#[async_trait]
pub trait TempTokenStore: Send + Sync {
    async fn insert(&self, new: NewTempToken) -> Result<TempToken, AppError>;

    async fn find(&self, token: &str) -> Result<Option<TempToken>, AppError>;

    /// Mark the token revoked. Returns false if it does not exist.
    async fn revoke(&self, token: &str) -> Result<bool, AppError>;

    /// Expired or revoked tokens whose file has not been reclaimed yet.
    async fn list_reclaimable(&self, now: DateTime<Utc>) -> Result<Vec<TempToken>, AppError>;

    /// Flag the token as reclaimed. Returns false if another caller got there
    /// first.
    async fn mark_reclaimed(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Read-only source of attachment categories.
#[async_trait]
pub trait CategoryProvider: Send + Sync {
    /// Active categories usable at the given level.
    async fn categories_for(&self, scope: ScopeLevel) -> Result<Vec<Category>, AppError>;

    async fn find_by_key(&self, key: &str) -> Result<Option<Category>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Category>, AppError>;
}
