use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::state::AppState;

fn content_type_for(name: &str) -> &'static str {
    if name.to_lowercase().ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    }
}

/// `attachment; filename="..."` with quotes and control characters removed.
fn content_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Stream the file behind a temp token. Expired, revoked and unknown
/// tokens all answer 404.
#[tracing::instrument(skip(state, token))]
pub async fn download_by_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, HttpAppError> {
    let download = state.tokens.resolve_download(&token).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                content_type_for(&download.display_name).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&download.display_name),
            ),
            (header::CONTENT_LENGTH, download.content_length.to_string()),
        ],
        Body::from_stream(download.stream),
    )
        .into_response())
}
