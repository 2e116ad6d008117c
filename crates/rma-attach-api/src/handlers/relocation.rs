use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use rma_attach_services::RelocationTarget;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::actor::RequestActor;
use crate::constants::MAX_BULK_RELOCATION_ITEMS;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LocationRequest {
    #[validate(range(min = 1))]
    pub record_id: i64,
    #[serde(default)]
    pub sub_scope_id: Option<i64>,
    #[serde(default)]
    pub category_key: Option<String>,
}

impl LocationRequest {
    fn target(self) -> RelocationTarget {
        RelocationTarget {
            record_id: self.record_id,
            sub_scope_id: self.sub_scope_id,
            category_key: self.category_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkRelocationRequest {
    #[validate(length(min = 1, max = MAX_BULK_RELOCATION_ITEMS))]
    pub attachment_ids: Vec<Uuid>,
    #[validate(nested)]
    pub target: LocationRequest,
}

#[tracing::instrument(skip(state, body), fields(actor = %actor))]
pub async fn relocate_attachment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
    ValidatedJson(body): ValidatedJson<LocationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let result = state
        .relocations
        .relocate(&actor, id, &body.target())
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state, body), fields(actor = %actor, count = body.attachment_ids.len()))]
pub async fn relocate_bulk(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    ValidatedJson(body): ValidatedJson<BulkRelocationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let ids = body.attachment_ids;
    let result = state
        .relocations
        .relocate_bulk(&actor, &ids, &body.target.target())
        .await?;
    Ok(Json(result))
}
