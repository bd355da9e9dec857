/// Database row types: these map directly to SQLite rows.
/// Distinct from civic-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct PrincipalRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct IssueRow {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub issue_title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub assigned_official: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ImageRow {
    pub issue_id: String,
    pub image_url: String,
}

#[derive(Debug, Clone)]
pub struct UpvoteRow {
    pub issue_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub issue_id: String,
    pub user_id: String,
    pub comment: String,
    pub created_at: String,
}

/// Column values for a new issue; id, status and created_at are filled in
/// by the insert.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub latitude: f64,
    pub longitude: f64,
    pub location: String,
    pub issue_title: String,
    pub description: Option<String>,
    pub category: String,
}

/// What happened to a delete-comment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentDeletion {
    Deleted,
    NotFound,
    NotOwner,
}
