pub mod auth;
pub mod comments;
mod convert;
pub mod error;
pub mod issues;
pub mod media;
pub mod middleware;
pub mod repository;
pub mod upvotes;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use civic_db::Database;

use crate::auth::AuthService;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::repository::IssueRepository;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub issues: IssueRepository,
    pub auth: AuthService,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, media: Arc<dyn MediaStore>, jwt_secret: String) -> AppState {
        Arc::new(Self {
            issues: IssueRepository::new(db.clone(), media),
            auth: AuthService::new(db, jwt_secret),
        })
    }
}

/// Build the full HTTP surface: auth, issues, and the uploaded media under
/// `/media`.
pub fn router(state: AppState, media_dir: &Path, body_limit: usize) -> Router {
    let public_routes = Router::new()
        .route("/api/admin/signup", post(auth::admin_signup))
        .route("/api/admin/login", post(auth::admin_login))
        .route("/api/users/signup", post(auth::user_signup))
        .route("/api/users/login", post(auth::user_login))
        .route("/api/issues", post(issues::create_issue).get(issues::list_issues))
        .route("/api/issues/{id}", get(issues::get_issue).patch(issues::update_issue))
        .route(
            "/api/issues/{id}/upvote",
            post(upvotes::add_upvote).delete(upvotes::remove_upvote),
        )
        .route("/api/issues/{id}/comments", post(comments::add_comment))
        .route(
            "/api/issues/{id}/comments/{comment_id}",
            delete(comments::delete_comment),
        )
        .with_state(state.clone());

    let user_session = Router::new()
        .route("/api/users/me", get(auth::me))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_user))
        .with_state(state.clone());

    let admin_session = Router::new()
        .route("/api/admin/me", get(auth::me))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(user_session)
        .merge(admin_session)
        .route("/health", get(|| async { "ok" }))
        .nest_service(media::MEDIA_ROUTE, ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run a blocking database call off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> civic_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(ApiError::from)
}
