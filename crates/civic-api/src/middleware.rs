use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use civic_types::models::PrincipalKind;

use crate::AppState;
use crate::error::ApiError;

/// Require a valid user session token in the Authorization header.
pub async fn require_user(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, PrincipalKind::User, req, next).await
}

/// Require a valid admin session token in the Authorization header.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, PrincipalKind::Admin, req, next).await
}

/// Extract and validate the bearer token; the verified claims are put into
/// the request extensions for handlers.
async fn authenticate(
    state: &AppState,
    kind: PrincipalKind,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state.auth.verify_token(token, kind)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
