//! Error rendering for handlers.
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Anything that
//! converts into `AppError` converts into `HttpAppError` and renders with the
//! same status, body and logging.

use axum::{
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rma_attach_core::{AppError, ErrorMetadata, LogLevel};
use serde::{de::DeserializeOwned, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Same value as `ErrorMetadata::error_code`.
    pub code: String,
    pub recoverable: bool,
}

/// `AppError` as an axum response. `AppError` lives in `rma-attach-core`,
/// so the `IntoResponse` impl needs a local type.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<validator::ValidationErrors> for HttpAppError {
    fn from(err: validator::ValidationErrors) -> Self {
        HttpAppError(err.into())
    }
}

/// Malformed JSON bodies become `INVALID_INPUT` with the usual body shape.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        let body_text = rejection.body_text();
        let message = if body_text.contains("expected a formatted UUID") {
            "Invalid request body: attachment ids must be UUID strings".to_string()
        } else {
            format!("Invalid request body: {}", body_text)
        };
        HttpAppError(AppError::InvalidInput(message))
    }
}

/// JSON body extractor that rejects with our ErrorResponse format and runs
/// the body's `Validate` rules.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(HttpAppError::from)?;
        inner.validate()?;
        Ok(ValidatedJson(inner))
    }
}

fn log_error(error: &AppError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, code, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, code, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, code, "Request failed");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

/// Errors whose internals (SQL, filesystem paths) must not reach clients.
fn is_sensitive(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. }
    )
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let details = if is_production_env() || is_sensitive(app_error) {
            None
        } else {
            Some(app_error.detailed_message())
        };

        let body = Json(ErrorResponse {
            error: app_error.client_message(),
            details,
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
        });

        (status, body).into_response()
    }
}
