use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use civic_types::api::{AddCommentRequest, CommentResponse, DeleteCommentRequest, MessageResponse};

use crate::AppState;
use crate::error::ApiError;

pub async fn add_comment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AddCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(issue_id) = path?;
    let Json(req) = payload?;
    let comment = state
        .issues
        .add_comment(issue_id, req.user_id, &req.comment)
        .await?;

    Ok((StatusCode::CREATED, Json(CommentResponse { comment })))
}

/// DELETE /api/issues/{id}/comments/{comment_id}: 403 unless the caller
/// wrote the comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<DeleteCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((issue_id, comment_id)) = path?;
    let Json(req) = payload?;
    state
        .issues
        .delete_comment(issue_id, comment_id, req.user_id)
        .await?;

    Ok(Json(MessageResponse {
        message: "Comment deleted".to_string(),
    }))
}
