//! Listing, deletion, reconciliation and audit trail handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use rma_attach_core::models::AttachmentFilter;
use rma_attach_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::record_id_from_path;
use crate::actor::RequestActor;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Value of `sub_scope` that selects record-level attachments only.
const RECORD_LEVEL: &str = "none";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Absent: every level. `none`: record level only. A number: that line.
    pub sub_scope: Option<String>,
    pub category: Option<String>,
}

fn parse_sub_scope_filter(raw: Option<&str>) -> Result<Option<Option<i64>>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case(RECORD_LEVEL) => Ok(Some(None)),
        Some(s) => s.parse::<i64>().map(|id| Some(Some(id))).map_err(|_| {
            AppError::InvalidInput(format!(
                "sub_scope must be a line id or '{}', got '{}'",
                RECORD_LEVEL, s
            ))
        }),
    }
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(record): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let filter = AttachmentFilter {
        record_id: record_id_from_path(&record)?,
        sub_scope_id: parse_sub_scope_filter(query.sub_scope.as_deref())?,
        category_key: query.category.filter(|c| !c.trim().is_empty()),
    };
    let attachments = state.attachments.list(&filter).await?;
    Ok(Json(attachments))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    pub sub_scope: Option<i64>,
    pub category: String,
}

pub async fn reconcile_directory(
    State(state): State<Arc<AppState>>,
    Path(record): Path<String>,
    Query(query): Query<ReconcileQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let record_id = record_id_from_path(&record)?;
    let report = state
        .attachments
        .reconcile(record_id, query.sub_scope, &query.category)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeleteRequest {
    #[validate(length(min = 1))]
    pub storage_path: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    ValidatedJson(body): ValidatedJson<DeleteRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let deleted = state
        .attachments
        .delete_by_path(&actor, &body.storage_path)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(format!(
            "No active attachment at {}",
            body.storage_path
        ))
        .into());
    }
    Ok(Json(DeleteResponse { deleted }))
}

pub async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let entries = state.audit.trail(id).await?;
    Ok(Json(entries))
}
