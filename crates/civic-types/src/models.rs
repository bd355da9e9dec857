use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two principal kinds. They live in separate tables and receive
/// separate tokens; there is no role hierarchy between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
}

impl PrincipalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Admin => "admin",
        }
    }
}

/// A user or admin as returned to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpvoteSummary {
    pub count: usize,
    pub users: Vec<Uuid>,
}

impl UpvoteSummary {
    pub fn from_users(users: Vec<Uuid>) -> Self {
        Self {
            count: users.len(),
            users,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub user_id: Uuid,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// An issue decorated with its images, upvotes and comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub issue_title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    /// Reserved for assigning an official; nothing sets it yet.
    pub assigned_official: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub images: Vec<String>,
    pub upvotes: UpvoteSummary,
    pub comments: Vec<Comment>,
}
