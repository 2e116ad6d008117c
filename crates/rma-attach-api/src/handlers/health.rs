use axum::{http::StatusCode, response::IntoResponse, Json};

/// Liveness check: the process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}
