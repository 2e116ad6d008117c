use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rma_attach_core::models::{NewTempToken, TempToken};
use rma_attach_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::TempTokenStore;

const TOKEN_COLUMNS: &str =
    "id, token, file_path, display_name, created_at, expires_at, is_deleted, is_reclaimed";

/// Repository for temporary download tokens
#[derive(Clone)]
pub struct TempTokenRepository {
    pool: PgPool,
}

impl TempTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TempTokenStore for TempTokenRepository {
    #[tracing::instrument(skip(self, new), fields(db.table = "temp_tokens", db.operation = "insert"))]
    async fn insert(&self, new: NewTempToken) -> Result<TempToken, AppError> {
        let token = sqlx::query_as::<Postgres, TempToken>(&format!(
            r#"
            INSERT INTO temp_tokens (token, file_path, display_name, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(&new.token)
        .bind(&new.file_path)
        .bind(&new.display_name)
        .bind(new.created_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "temp_tokens", db.operation = "select"))]
    async fn find(&self, token: &str) -> Result<Option<TempToken>, AppError> {
        let row = sqlx::query_as::<Postgres, TempToken>(&format!(
            "SELECT {} FROM temp_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "temp_tokens", db.operation = "update"))]
    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE temp_tokens SET is_deleted = TRUE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "temp_tokens", db.operation = "select"))]
    async fn list_reclaimable(&self, now: DateTime<Utc>) -> Result<Vec<TempToken>, AppError> {
        let rows = sqlx::query_as::<Postgres, TempToken>(&format!(
            r#"
            SELECT {}
            FROM temp_tokens
            WHERE NOT is_reclaimed AND (is_deleted OR expires_at <= $1)
            ORDER BY expires_at ASC
            "#,
            TOKEN_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "temp_tokens", db.operation = "update", db.record_id = %id))]
    async fn mark_reclaimed(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE temp_tokens SET is_reclaimed = TRUE WHERE id = $1 AND NOT is_reclaimed",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
