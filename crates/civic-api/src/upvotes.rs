use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    response::IntoResponse,
};
use uuid::Uuid;

use civic_types::api::{UpvoteRequest, UpvoteResponse};

use crate::AppState;
use crate::error::ApiError;

/// POST /api/issues/{id}/upvote: 409 if this user already upvoted.
pub async fn add_upvote(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpvoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(issue_id) = path?;
    let Json(req) = payload?;
    let upvotes = state.issues.add_upvote(issue_id, req.user_id).await?;

    Ok(Json(UpvoteResponse {
        message: "Upvote added".to_string(),
        upvotes,
    }))
}

/// DELETE /api/issues/{id}/upvote: succeeds whether or not the upvote existed.
pub async fn remove_upvote(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpvoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(issue_id) = path?;
    let Json(req) = payload?;
    let upvotes = state.issues.remove_upvote(issue_id, req.user_id).await?;

    Ok(Json(UpvoteResponse {
        message: "Upvote removed".to_string(),
        upvotes,
    }))
}
