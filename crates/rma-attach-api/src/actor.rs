//! Caller identity extraction.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rma_attach_core::constants::SYSTEM_ACTOR;
use rma_attach_core::{Actor, AppError};

use crate::constants::ACTOR_HEADER;
use crate::error::HttpAppError;

/// The actor named by the `X-Actor` header.
///
/// Required on every mutating route. The system identity is reserved for
/// the engine's own compensating actions and cannot be claimed by a caller.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::Unauthorized("X-Actor header is required".to_string()))?;

        if name.eq_ignore_ascii_case(SYSTEM_ACTOR) {
            return Err(AppError::Forbidden(format!(
                "'{}' is a reserved identity",
                SYSTEM_ACTOR
            ))
            .into());
        }

        Ok(RequestActor(Actor::user(name)))
    }
}
