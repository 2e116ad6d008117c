//! Multipart upload handler.

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rma_attach_core::AppError;
use rma_attach_services::{ConflictStrategy, UploadFile, UploadOutcome, UploadRequest};
use rma_attach_storage::UploadReader;
use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::record_id_from_path;
use crate::actor::RequestActor;
use crate::constants::MAX_FILES_PER_REQUEST;
use crate::error::HttpAppError;
use crate::state::AppState;

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::InvalidInput(format!("Failed to read multipart: {}", e))
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map(|s| s.trim().to_string()).map_err(multipart_error)
}

/// Copy a file part into an anonymous temp file under `spool_dir` and hand
/// it back rewound. At most `limit + 1` bytes are kept, enough for the size
/// check to reject the file without holding the rest.
async fn spool_part(
    mut field: Field<'_>,
    spool_dir: &FsPath,
    limit: u64,
) -> Result<UploadReader, AppError> {
    let spool_error =
        |e: std::io::Error| AppError::Storage(format!("Failed to spool upload: {}", e));

    let file = tempfile::tempfile_in(spool_dir).map_err(spool_error)?;
    let mut file = tokio::fs::File::from_std(file);

    let keep = limit.saturating_add(1);
    let mut kept: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if kept >= keep {
            continue;
        }
        let take = usize::try_from(keep - kept).map_or(chunk.len(), |room| room.min(chunk.len()));
        file.write_all(&chunk[..take]).await.map_err(spool_error)?;
        kept += take as u64;
    }

    file.flush().await.map_err(spool_error)?;
    file.seek(SeekFrom::Start(0)).await.map_err(spool_error)?;
    Ok(Box::pin(file))
}

/// Upload files to a record.
///
/// Form fields: `category` (required), `sub_scope` (optional line id),
/// `strategy` (optional: skip, rename, overwrite) and any number of file
/// parts. Returns 409 with the conflicting names when a name is taken and no
/// strategy was given.
#[tracing::instrument(skip(state, multipart), fields(actor = %actor))]
pub async fn upload_attachments(
    State(state): State<Arc<AppState>>,
    Path(record): Path<String>,
    RequestActor(actor): RequestActor,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let record_id = record_id_from_path(&record)?;

    let mut category_key = None;
    let mut sub_scope_id = None;
    let mut strategy = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            if files.len() as u64 >= MAX_FILES_PER_REQUEST {
                return Err(AppError::InvalidInput(format!(
                    "At most {} files can be uploaded at once",
                    MAX_FILES_PER_REQUEST
                ))
                .into());
            }
            let reader = spool_part(field, &state.spool_dir, state.max_file_size_bytes).await?;
            files.push(UploadFile::new(file_name, reader));
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "category" => category_key = Some(field_text(field).await?),
            "sub_scope" => {
                let raw = field_text(field).await?;
                if !raw.is_empty() {
                    sub_scope_id = Some(raw.parse::<i64>().map_err(|_| {
                        AppError::InvalidInput(format!("sub_scope '{}' is not a number", raw))
                    })?);
                }
            }
            "strategy" => {
                let raw = field_text(field).await?;
                if !raw.is_empty() {
                    strategy = Some(
                        raw.parse::<ConflictStrategy>()
                            .map_err(|e| AppError::InvalidInput(e.to_string()))?,
                    );
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let category_key = category_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::InvalidInput("category field is required".to_string()))?;

    let request = UploadRequest {
        record_id,
        sub_scope_id,
        category_key,
        strategy,
    };
    let outcome = state.uploads.upload(&actor, request, files).await?;

    let status = match outcome {
        UploadOutcome::ConflictDetected { .. } => StatusCode::CONFLICT,
        UploadOutcome::Completed { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
