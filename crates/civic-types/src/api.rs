use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Comment, Issue, PrincipalKind, UpvoteSummary};

// -- JWT Claims --

/// Session token claims. `kind` keeps a user token from passing an admin
/// check and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub kind: PrincipalKind,
    pub exp: usize,
}

// -- Auth --

/// Shared by signup and login for both principal kinds. Fields default to
/// empty so a missing field is reported as a validation error, not a
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

// -- Issues --

/// Partial update. Only fields that are present are written.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuePatch {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub issue_title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

impl IssuePatch {
    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.location.is_none()
            && self.issue_title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct CreateIssueResponse {
    pub message: String,
    pub issue: Issue,
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueResponse {
    pub issue: Issue,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueListResponse {
    pub issues: Vec<Issue>,
}

// -- Upvotes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpvoteRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpvoteResponse {
    pub message: String,
    pub upvotes: UpvoteSummary,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCommentRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteCommentRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_detected() {
        let patch: IssuePatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());

        let patch: IssuePatch = serde_json::from_str(r#"{"status":"resolved"}"#).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result = serde_json::from_str::<IssuePatch>(r#"{"assigned_official":null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn principal_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PrincipalKind::Admin).unwrap(), "\"admin\"");
        assert_eq!(PrincipalKind::User.as_str(), "user");
    }
}
