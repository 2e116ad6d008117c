use async_trait::async_trait;
use rma_attach_core::models::{Category, ScopeLevel};
use rma_attach_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::CategoryProvider;

/// Repository for attachment categories
#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a category. Used by seeding and tests; categories are otherwise
    /// managed outside this service.
    #[tracing::instrument(skip(self, allowed_extensions), fields(db.table = "attachment_categories", db.operation = "insert"))]
    pub async fn create(
        &self,
        key: &str,
        label: &str,
        allowed_extensions: &[String],
        scope: ScopeLevel,
    ) -> Result<Category, AppError> {
        let category = sqlx::query_as::<Postgres, Category>(
            r#"
            INSERT INTO attachment_categories (key, label, allowed_extensions, scope)
            VALUES ($1, $2, $3, $4)
            RETURNING id, key, label, allowed_extensions, scope, is_active
            "#,
        )
        .bind(key)
        .bind(label)
        .bind(allowed_extensions)
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;

        Ok(category)
    }
}

#[async_trait]
impl CategoryProvider for CategoryRepository {
    #[tracing::instrument(skip(self), fields(db.table = "attachment_categories", db.operation = "select"))]
    async fn categories_for(&self, scope: ScopeLevel) -> Result<Vec<Category>, AppError> {
        let categories = sqlx::query_as::<Postgres, Category>(
            r#"
            SELECT id, key, label, allowed_extensions, scope, is_active
            FROM attachment_categories
            WHERE scope = $1 AND is_active
            ORDER BY label ASC
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachment_categories", db.operation = "select"))]
    async fn find_by_key(&self, key: &str) -> Result<Option<Category>, AppError> {
        let category = sqlx::query_as::<Postgres, Category>(
            "SELECT id, key, label, allowed_extensions, scope, is_active FROM attachment_categories WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachment_categories", db.operation = "select", db.record_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Category>, AppError> {
        let category = sqlx::query_as::<Postgres, Category>(
            "SELECT id, key, label, allowed_extensions, scope, is_active FROM attachment_categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }
}
