use async_trait::async_trait;
use rma_attach_core::models::{AuditLogEntry, NewAuditEntry};
use rma_attach_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::AuditLogStore;

/// Repository for the append-only attachment audit ledger
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for AuditLogRepository {
    #[tracing::instrument(skip(self, entry), fields(db.table = "attachment_audit_log", db.operation = "insert", attachment_id = %entry.attachment_id, action = %entry.action))]
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AppError> {
        let row = sqlx::query_as::<Postgres, AuditLogEntry>(
            r#"
            INSERT INTO attachment_audit_log (attachment_id, action, detail, actor, is_system)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, attachment_id, action, detail, actor, is_system, created_at
            "#,
        )
        .bind(entry.attachment_id)
        .bind(entry.action)
        .bind(&entry.detail)
        .bind(&entry.actor)
        .bind(entry.is_system)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachment_audit_log", db.operation = "select"))]
    async fn list_for_attachment(
        &self,
        attachment_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        let rows = sqlx::query_as::<Postgres, AuditLogEntry>(
            r#"
            SELECT id, attachment_id, action, detail, actor, is_system, created_at
            FROM attachment_audit_log
            WHERE attachment_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(attachment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
