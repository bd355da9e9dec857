use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use civic_db::models::{CommentDeletion, CommentRow, IssueRow, NewIssue};
use civic_db::{Database, DbError};
use civic_types::api::IssuePatch;
use civic_types::models::{Comment, Issue, UpvoteSummary};

use crate::convert::{parse_id, parse_timestamp};
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::run_blocking;

/// Most images a single issue may carry.
pub const MAX_IMAGES: usize = 10;

/// Issues and everything hanging off them: images, upvotes, comments.
pub struct IssueRepository {
    db: Arc<Database>,
    media: Arc<dyn MediaStore>,
}

impl IssueRepository {
    pub fn new(db: Arc<Database>, media: Arc<dyn MediaStore>) -> Self {
        Self { db, media }
    }

    /// Upload the images, then write the issue, the submitter's upvote and
    /// the image rows in one transaction. On any failure nothing stays
    /// behind: uploaded files are deleted again and the transaction is
    /// rolled back.
    pub async fn create_issue(
        &self,
        fields: NewIssue,
        images: Vec<Bytes>,
        submitter: Option<Uuid>,
    ) -> Result<(Issue, Vec<String>), ApiError> {
        if images.len() > MAX_IMAGES {
            return Err(ApiError::Validation(format!(
                "Maximum {} images allowed",
                MAX_IMAGES
            )));
        }

        let results = join_all(images.into_iter().map(|bytes| self.media.upload(bytes))).await;

        let mut urls = Vec::with_capacity(results.len());
        let mut upload_error = None;
        for result in results {
            match result {
                Ok(url) => urls.push(url),
                Err(e) => upload_error = Some(e),
            }
        }
        if let Some(e) = upload_error {
            self.discard_media(&urls).await;
            return Err(ApiError::Internal(format!("Image upload failed: {}", e)));
        }

        let id = Uuid::new_v4().to_string();
        let submitter = submitter.map(|u| u.to_string());
        let stored_urls = urls.clone();
        let created = run_blocking(&self.db, move |db| {
            db.create_issue(&id, &fields, submitter.as_deref(), &stored_urls)
        })
        .await;

        let row = match created {
            Ok(row) => row,
            Err(e) => {
                self.discard_media(&urls).await;
                return Err(e);
            }
        };

        info!("Created issue {} with {} image(s)", row.id, urls.len());
        let issue = self.decorate_one(row).await?;
        Ok((issue, urls))
    }

    pub async fn list_issues(&self) -> Result<Vec<Issue>, ApiError> {
        let rows = run_blocking(&self.db, |db| db.get_issues()).await?;
        self.decorate(rows).await
    }

    pub async fn get_issue(&self, id: Uuid) -> Result<Issue, ApiError> {
        let row = run_blocking(&self.db, move |db| db.get_issue(&id.to_string()))
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))?;
        self.decorate_one(row).await
    }

    pub async fn update_issue(&self, id: Uuid, mut patch: IssuePatch) -> Result<Issue, ApiError> {
        if patch.is_empty() {
            return Err(ApiError::Validation("No fields to update".to_string()));
        }
        // Fields required at creation may be changed but never cleared.
        for (name, value) in [
            ("location", &mut patch.location),
            ("issue_title", &mut patch.issue_title),
            ("category", &mut patch.category),
            ("status", &mut patch.status),
        ] {
            if let Some(v) = value {
                *v = v.trim().to_string();
                if v.is_empty() {
                    return Err(ApiError::Validation(format!("{} cannot be blank", name)));
                }
            }
        }

        let row = run_blocking(&self.db, move |db| db.update_issue(&id.to_string(), &patch))
            .await?
            .ok_or_else(|| ApiError::NotFound("Issue not found".to_string()))?;
        self.decorate_one(row).await
    }

    /// Returns the issue's upvotes after the insert.
    pub async fn add_upvote(&self, issue_id: Uuid, user_id: Uuid) -> Result<UpvoteSummary, ApiError> {
        let issue = issue_id.to_string();
        let user = user_id.to_string();
        run_blocking(&self.db, move |db| db.insert_upvote(&issue, &user))
            .await
            .map_err(|e| match e {
                ApiError::Conflict(_) => {
                    ApiError::Conflict("User has already upvoted this issue".to_string())
                }
                other => other,
            })?;

        self.upvotes_of(issue_id).await
    }

    /// Removing an upvote that is not there is not an error.
    pub async fn remove_upvote(
        &self,
        issue_id: Uuid,
        user_id: Uuid,
    ) -> Result<UpvoteSummary, ApiError> {
        let issue = issue_id.to_string();
        let user = user_id.to_string();
        run_blocking(&self.db, move |db| db.delete_upvote(&issue, &user)).await?;

        self.upvotes_of(issue_id).await
    }

    pub async fn add_comment(
        &self,
        issue_id: Uuid,
        user_id: Uuid,
        text: &str,
    ) -> Result<Comment, ApiError> {
        let text = text.trim().to_string();
        if text.is_empty() || user_id.is_nil() {
            return Err(ApiError::Validation(
                "user_id and comment are required".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let row = run_blocking(&self.db, move |db| {
            db.insert_comment(&id, &issue_id.to_string(), &user_id.to_string(), &text)
        })
        .await?;

        Ok(comment_from_row(row))
    }

    /// Only the author may delete a comment. A missing comment and someone
    /// else's comment are reported separately.
    pub async fn delete_comment(
        &self,
        issue_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ApiError> {
        let outcome = run_blocking(&self.db, move |db| {
            db.delete_comment(
                &issue_id.to_string(),
                &comment_id.to_string(),
                &user_id.to_string(),
            )
        })
        .await?;

        match outcome {
            CommentDeletion::Deleted => Ok(()),
            CommentDeletion::NotFound => Err(ApiError::NotFound("Comment not found".to_string())),
            CommentDeletion::NotOwner => Err(ApiError::Forbidden(
                "Not allowed to delete this comment".to_string(),
            )),
        }
    }

    async fn upvotes_of(&self, issue_id: Uuid) -> Result<UpvoteSummary, ApiError> {
        let ids = vec![issue_id.to_string()];
        let rows = run_blocking(&self.db, move |db| db.get_upvotes_for_issues(&ids)).await?;
        Ok(UpvoteSummary::from_users(
            rows.iter().map(|r| parse_id(&r.user_id, "upvote user_id")).collect(),
        ))
    }

    async fn decorate_one(&self, row: IssueRow) -> Result<Issue, ApiError> {
        self.decorate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| ApiError::Internal("Issue vanished while loading".to_string()))
    }

    /// Attach images, upvotes and comments to each row. One batched query per
    /// relation, grouped by issue id.
    async fn decorate(&self, rows: Vec<IssueRow>) -> Result<Vec<Issue>, ApiError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let (images, upvotes, comments) = run_blocking(&self.db, move |db| {
            Ok::<_, DbError>((
                db.get_images_for_issues(&ids)?,
                db.get_upvotes_for_issues(&ids)?,
                db.get_comments_for_issues(&ids)?,
            ))
        })
        .await?;

        let mut images_by_issue: HashMap<String, Vec<String>> = HashMap::new();
        for image in images {
            images_by_issue
                .entry(image.issue_id)
                .or_default()
                .push(image.image_url);
        }

        let mut upvotes_by_issue: HashMap<String, Vec<Uuid>> = HashMap::new();
        for upvote in &upvotes {
            upvotes_by_issue
                .entry(upvote.issue_id.clone())
                .or_default()
                .push(parse_id(&upvote.user_id, "upvote user_id"));
        }

        let mut comments_by_issue: HashMap<String, Vec<Comment>> = HashMap::new();
        for comment in comments {
            comments_by_issue
                .entry(comment.issue_id.clone())
                .or_default()
                .push(comment_from_row(comment));
        }

        let issues = rows
            .into_iter()
            .map(|row| {
                let images = images_by_issue.remove(&row.id).unwrap_or_default();
                let upvotes = upvotes_by_issue.remove(&row.id).unwrap_or_default();
                let comments = comments_by_issue.remove(&row.id).unwrap_or_default();

                Issue {
                    id: parse_id(&row.id, "issue id"),
                    latitude: row.latitude,
                    longitude: row.longitude,
                    location: row.location,
                    issue_title: row.issue_title,
                    description: row.description,
                    category: row.category,
                    status: row.status,
                    assigned_official: None,
                    created_at: parse_timestamp(&row.created_at),
                    images,
                    upvotes: UpvoteSummary::from_users(upvotes),
                    comments,
                }
            })
            .collect();

        Ok(issues)
    }

    async fn discard_media(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.media.delete(url).await {
                warn!("Could not remove orphaned image {}: {}", url, e);
            }
        }
    }
}

fn comment_from_row(row: CommentRow) -> Comment {
    Comment {
        id: parse_id(&row.id, "comment id"),
        issue_id: parse_id(&row.issue_id, "comment issue_id"),
        user_id: parse_id(&row.user_id, "comment user_id"),
        comment: row.comment,
        created_at: parse_timestamp(&row.created_at),
    }
}
