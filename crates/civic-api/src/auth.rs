use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use civic_db::Database;
use civic_db::models::PrincipalRow;
use civic_types::api::{Claims, CredentialsRequest};
use civic_types::models::{Principal, PrincipalKind};

use crate::AppState;
use crate::convert::{parse_id, parse_timestamp};
use crate::error::ApiError;
use crate::run_blocking;

/// Session tokens expire one hour after login.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Signup and login for users and admins, and verification of the tokens
/// handed out at login.
pub struct AuthService {
    db: Arc<Database>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(db: Arc<Database>, jwt_secret: String) -> Self {
        Self { db, jwt_secret }
    }

    pub async fn signup(
        &self,
        kind: PrincipalKind,
        username: &str,
        password: &str,
    ) -> Result<Principal, ApiError> {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Username and password required".to_string(),
            ));
        }
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        let id = Uuid::new_v4().to_string();
        let row = run_blocking(&self.db, move |db| {
            db.create_principal(kind, &id, &username, &password_hash)
        })
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("Username already exists".to_string()),
            other => other,
        })?;

        info!("Created {} {}", kind.as_str(), row.username);
        Ok(principal_from_row(&row))
    }

    /// Returns the principal and a fresh session token.
    pub async fn login(
        &self,
        kind: PrincipalKind,
        username: &str,
        password: &str,
    ) -> Result<(Principal, String), ApiError> {
        let name = username.trim().to_string();
        if name.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Username and password required".to_string(),
            ));
        }

        let row = run_blocking(&self.db, move |db| db.get_principal_by_username(kind, &name))
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized(format!(
                    "{} with this username does not exist",
                    capitalized(kind)
                ))
            })?;

        let parsed_hash = PasswordHash::new(&row.password_hash)
            .map_err(|e| ApiError::Internal(format!("Stored password hash unreadable: {}", e)))?;

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            warn!("Failed login for {} {}", kind.as_str(), row.username);
            return Err(ApiError::Unauthorized("Incorrect password".to_string()));
        }

        let principal = principal_from_row(&row);
        let token = self.create_token(kind, &principal)?;
        Ok((principal, token))
    }

    pub fn create_token(&self, kind: PrincipalKind, principal: &Principal) -> Result<String, ApiError> {
        let claims = Claims {
            sub: principal.id,
            username: principal.username.clone(),
            kind,
            exp: (chrono::Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECS)).timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Check signature and expiry, and that the token belongs to `kind`.
    pub fn verify_token(&self, token: &str, kind: PrincipalKind) -> Result<Claims, ApiError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        if token_data.claims.kind != kind {
            return Err(ApiError::Unauthorized(format!(
                "Token is not a {} token",
                kind.as_str()
            )));
        }
        Ok(token_data.claims)
    }
}

fn principal_from_row(row: &PrincipalRow) -> Principal {
    Principal {
        id: parse_id(&row.id, "principal id"),
        username: row.username.clone(),
        created_at: parse_timestamp(&row.created_at),
    }
}

fn capitalized(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "User",
        PrincipalKind::Admin => "Admin",
    }
}

/// `{"message": ..., "<kind>": principal, "token"?: ...}`
fn principal_body(
    kind: PrincipalKind,
    message: &str,
    principal: Principal,
    token: Option<String>,
) -> Result<Json<Value>, ApiError> {
    let principal =
        serde_json::to_value(principal).map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut body = Map::new();
    body.insert("message".to_string(), Value::from(message));
    body.insert(kind.as_str().to_string(), principal);
    if let Some(token) = token {
        body.insert("token".to_string(), Value::from(token));
    }
    Ok(Json(Value::Object(body)))
}

async fn signup(
    state: AppState,
    kind: PrincipalKind,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let principal = state.auth.signup(kind, &req.username, &req.password).await?;
    let message = format!("{} created", capitalized(kind));
    Ok((
        StatusCode::CREATED,
        principal_body(kind, &message, principal, None)?,
    ))
}

async fn login(
    state: AppState,
    kind: PrincipalKind,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (principal, token) = state.auth.login(kind, &req.username, &req.password).await?;
    principal_body(kind, "Login successful", principal, Some(token))
}

pub async fn user_signup(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    signup(state, PrincipalKind::User, payload).await
}

pub async fn user_login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    login(state, PrincipalKind::User, payload).await
}

pub async fn admin_signup(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    signup(state, PrincipalKind::Admin, payload).await
}

pub async fn admin_login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    login(state, PrincipalKind::Admin, payload).await
}

/// GET /api/users/me, /api/admin/me: echo the verified session claims.
pub async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}
