use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rma_attach_core::models::{
    Attachment, AttachmentFilter, AttachmentLocation, AttachmentWithCategory, NewAttachment,
};
use rma_attach_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::AttachmentStore;

const ATTACHMENT_COLUMNS: &str = "id, record_id, sub_scope_id, file_name, storage_path, size_bytes, \
     category_id, uploaded_by, uploaded_at, is_deleted, deleted_by, deleted_at";

/// Repository for attachment tracking rows
#[derive(Clone)]
pub struct AttachmentRepository {
    pool: PgPool,
}

impl AttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Turn a unique-index violation on `storage_path` into a conflict.
fn map_unique_violation(err: sqlx::Error, storage_path: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(
            format!("An active attachment already exists at {}", storage_path),
        ),
        _ => AppError::from(err),
    }
}

#[async_trait]
impl AttachmentStore for AttachmentRepository {
    #[tracing::instrument(skip(self), fields(db.table = "attachments", db.operation = "select"))]
    async fn find_active_by_path(
        &self,
        storage_path: &str,
    ) -> Result<Option<Attachment>, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE storage_path = $1 AND NOT is_deleted",
            ATTACHMENT_COLUMNS
        ))
        .bind(storage_path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE id = $1",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "attachments", db.operation = "select", count = ids.len()))]
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let attachments = sqlx::query_as::<Postgres, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE id = ANY($1) AND NOT is_deleted \
             ORDER BY array_position($1, id)",
            ATTACHMENT_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }

    #[tracing::instrument(skip(self, new), fields(db.table = "attachments", db.operation = "insert", record_id = new.record_id))]
    async fn insert(&self, new: NewAttachment) -> Result<Attachment, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            INSERT INTO attachments
                (record_id, sub_scope_id, file_name, storage_path, size_bytes, category_id, uploaded_by, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(new.record_id)
        .bind(new.sub_scope_id)
        .bind(&new.file_name)
        .bind(&new.storage_path)
        .bind(new.size_bytes)
        .bind(new.category_id)
        .bind(&new.uploaded_by)
        .bind(new.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &new.storage_path))?;

        Ok(attachment)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments", db.operation = "update", db.record_id = %id))]
    async fn record_overwrite(
        &self,
        id: Uuid,
        size_bytes: i64,
        uploaded_by: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Attachment, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            UPDATE attachments
            SET size_bytes = $2, uploaded_by = $3, uploaded_at = $4
            WHERE id = $1 AND NOT is_deleted
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .bind(size_bytes)
        .bind(uploaded_by)
        .bind(uploaded_at)
        .fetch_optional(&self.pool)
        .await?;

        attachment.ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))
    }

    #[tracing::instrument(skip(self, location), fields(db.table = "attachments", db.operation = "update", db.record_id = %id))]
    async fn relocate(
        &self,
        id: Uuid,
        location: &AttachmentLocation,
    ) -> Result<Attachment, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            UPDATE attachments
            SET record_id = $2, sub_scope_id = $3, category_id = $4, storage_path = $5
            WHERE id = $1 AND NOT is_deleted
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .bind(location.record_id)
        .bind(location.sub_scope_id)
        .bind(location.category_id)
        .bind(&location.storage_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &location.storage_path))?;

        attachment.ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments", db.operation = "update"))]
    async fn soft_delete_by_path(
        &self,
        storage_path: &str,
        deleted_by: &str,
    ) -> Result<Option<Attachment>, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            UPDATE attachments
            SET is_deleted = TRUE, deleted_by = $2, deleted_at = NOW()
            WHERE storage_path = $1 AND NOT is_deleted
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(storage_path)
        .bind(deleted_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachments", db.operation = "select", record_id = filter.record_id))]
    async fn list(
        &self,
        filter: &AttachmentFilter,
    ) -> Result<Vec<AttachmentWithCategory>, AppError> {
        // $2 tells whether the sub-scope filter applies at all, $3 is its value
        // (NULL meaning record-level only).
        let attachments = sqlx::query_as::<Postgres, AttachmentWithCategory>(
            r#"
            SELECT a.id, a.record_id, a.sub_scope_id, a.file_name, a.storage_path, a.size_bytes,
                   a.category_id, a.uploaded_by, a.uploaded_at, a.is_deleted, a.deleted_by, a.deleted_at,
                   c.key AS category_key, c.label AS category_label
            FROM attachments a
            JOIN attachment_categories c ON c.id = a.category_id
            WHERE a.record_id = $1
              AND NOT a.is_deleted
              AND (NOT $2 OR a.sub_scope_id IS NOT DISTINCT FROM $3)
              AND ($4::TEXT IS NULL OR c.key = $4)
            ORDER BY a.file_name ASC
            "#,
        )
        .bind(filter.record_id)
        .bind(filter.sub_scope_id.is_some())
        .bind(filter.sub_scope_id.flatten())
        .bind(filter.category_key.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }
}
