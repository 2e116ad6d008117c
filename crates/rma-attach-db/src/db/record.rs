use rma_attach_core::AppError;
use sqlx::{PgPool, Postgres};

/// Read-only lookups against the RMA record tables
#[derive(Clone)]
pub struct RecordRepository {
    pool: PgPool,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "rma_records", db.operation = "select"))]
    pub async fn record_exists(&self, record_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM rma_records WHERE id = $1)",
        )
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Whether `line_id` is a line of `record_id`.
    #[tracing::instrument(skip(self), fields(db.table = "rma_lines", db.operation = "select"))]
    pub async fn line_exists(&self, record_id: i64, line_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM rma_lines WHERE id = $1 AND record_id = $2)",
        )
        .bind(line_id)
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
