//! Route configuration and setup.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::constants::{ACTOR_HEADER, API_PREFIX, MAX_CONCURRENT_REQUESTS, MAX_FILES_PER_REQUEST};
use crate::handlers::{archive, attachments, download, health, relocation, upload};
use crate::state::AppState;

/// Largest request body accepted: a full batch of maximum-size files.
pub fn request_body_limit(max_file_size_bytes: u64) -> usize {
    usize::try_from(max_file_size_bytes.saturating_mul(MAX_FILES_PER_REQUEST)).unwrap_or(usize::MAX)
}

/// The API routes with their state, without the outer middleware stack.
pub fn api_router(state: Arc<AppState>) -> Router {
    let body_limit = request_body_limit(state.max_file_size_bytes);

    let api = Router::new()
        .route(
            "/records/{record}/attachments",
            post(upload::upload_attachments).get(attachments::list_attachments),
        )
        .route(
            "/records/{record}/reconcile",
            get(attachments::reconcile_directory),
        )
        .route("/attachments", delete(attachments::delete_attachment))
        .route(
            "/attachments/{id}/location",
            patch(relocation::relocate_attachment),
        )
        .route("/attachments/relocate", post(relocation::relocate_bulk))
        .route("/attachments/{id}/audit", get(attachments::audit_trail))
        .route("/archives", post(archive::build_archive))
        .route("/downloads/{token}", get(download::download_by_token))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit));

    Router::new()
        .route("/health", get(health::liveness_check))
        .nest(API_PREFIX, api)
        .with_state(state)
}

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ACTOR_HEADER),
        ]);

    api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
}
