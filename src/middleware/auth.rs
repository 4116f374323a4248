//! Bearer-token middleware for the file routes.

use crate::{errors::AppError, services::token_service::TokenValidator};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

/// The user a request was authenticated as, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid `Authorization: Bearer <token>` header.
///
/// On success the resolved [`AuthUser`] is inserted into the request
/// extensions for handlers that want it.
pub async fn require_bearer(
    State(validator): State<Arc<dyn TokenValidator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("authorization header is missing"))?;

    let token = extract_bearer_token(header)
        .ok_or_else(|| AppError::unauthorized("invalid authorization format"))?;

    let user_id = validator.validate(token).map_err(|err| {
        debug!(error = %err, "rejected bearer token");
        AppError::from(err)
    })?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}
