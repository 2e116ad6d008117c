use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::actor::RequestActor;
use crate::constants::{API_PREFIX, MAX_ARCHIVE_ITEMS};
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ArchiveRequest {
    #[validate(length(min = 1, max = MAX_ARCHIVE_ITEMS))]
    pub attachment_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub download_token: String,
    pub download_url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub processed_count: usize,
    pub skipped: Vec<Uuid>,
}

/// Package attachments into a ZIP and return a short-lived download link.
#[tracing::instrument(skip(state, body), fields(actor = %actor, count = body.attachment_ids.len()))]
pub async fn build_archive(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    ValidatedJson(body): ValidatedJson<ArchiveRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let result = state
        .archives
        .build_archive(&body.attachment_ids, &body.name)
        .await?;

    Ok(Json(ArchiveResponse {
        download_url: format!("{}/downloads/{}", API_PREFIX, result.download_token),
        download_token: result.download_token,
        file_name: result.file_name,
        size_bytes: result.size_bytes,
        processed_count: result.processed_count,
        skipped: result.skipped,
    }))
}
