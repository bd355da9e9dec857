use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use civic_db::models::NewIssue;
use civic_types::api::{CreateIssueResponse, IssueListResponse, IssuePatch, IssueResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::repository::MAX_IMAGES;

/// Multipart field carrying the photos.
const IMAGES_FIELD: &str = "images";

/// Text fields of the issue submission form, as received.
#[derive(Debug, Default)]
struct IssueForm {
    latitude: Option<String>,
    longitude: Option<String>,
    location: Option<String>,
    issue_title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    user_id: Option<String>,
}

impl IssueForm {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "location" => &mut self.location,
            "issue_title" => &mut self.issue_title,
            "description" => &mut self.description,
            "category" => &mut self.category,
            "user_id" => &mut self.user_id,
            other => {
                debug!("Ignoring unknown form field '{}'", other);
                return;
            }
        };
        *slot = Some(value);
    }

    /// Check every required field is present and well-formed.
    fn validate(self) -> Result<(NewIssue, Uuid), ApiError> {
        let missing =
            || ApiError::Validation("Required fields missing (including user_id)".to_string());
        let required = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let latitude = required(self.latitude).ok_or_else(missing)?;
        let longitude = required(self.longitude).ok_or_else(missing)?;
        let location = required(self.location).ok_or_else(missing)?;
        let issue_title = required(self.issue_title).ok_or_else(missing)?;
        let category = required(self.category).ok_or_else(missing)?;
        let user_id = required(self.user_id).ok_or_else(missing)?;

        let coordinate = |raw: &str, name: &str| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ApiError::Validation(format!("{} must be a number", name)))
        };

        let fields = NewIssue {
            latitude: coordinate(latitude.as_str(), "latitude")?,
            longitude: coordinate(longitude.as_str(), "longitude")?,
            location,
            issue_title,
            description: required(self.description),
            category,
        };
        let user_id = user_id
            .parse::<Uuid>()
            .map_err(|_| ApiError::Validation("user_id must be a UUID".to_string()))?;

        Ok((fields, user_id))
    }
}

/// POST /api/issues: multipart form with up to ten `images` files.
pub async fn create_issue(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart?;
    let mut form = IssueForm::default();
    let mut images: Vec<Bytes> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == IMAGES_FIELD {
            let bytes = field.bytes().await?;
            // Browsers send an empty part when no file was picked.
            if bytes.is_empty() {
                continue;
            }
            images.push(bytes);
            if images.len() > MAX_IMAGES {
                return Err(ApiError::Validation(format!(
                    "Maximum {} images allowed",
                    MAX_IMAGES
                )));
            }
        } else {
            let value = field.text().await?;
            form.set(&name, value);
        }
    }

    let (fields, user_id) = form.validate()?;
    let (issue, images) = state
        .issues
        .create_issue(fields, images, Some(user_id))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateIssueResponse {
            message: "Issue created".to_string(),
            issue,
            images,
        }),
    ))
}

pub async fn list_issues(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let issues = state.issues.list_issues().await?;
    Ok(Json(IssueListResponse { issues }))
}

pub async fn get_issue(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let issue = state.issues.get_issue(id).await?;
    Ok(Json(IssueResponse { issue }))
}

/// PATCH /api/issues/{id}: partial update; an empty body is a 400.
pub async fn update_issue(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<IssuePatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    let issue = state.issues.update_issue(id, patch).await?;
    Ok(Json(IssueResponse { issue }))
}
