use anyhow::Context;
use axum::{
    extract::{Extension, Json, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bcrypt::{DEFAULT_COST, hash, verify};
use common::Role;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::AuthUser;
use crate::db::models::User;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

/// Validates username format
/// - Must be 3-20 characters long
/// - Can only contain alphanumeric characters, underscores, and hyphens
pub fn validate_username(username: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if username.len() < 3 {
        errors.push("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 20 {
        errors.push("Username must be at most 20 characters long".to_string());
    }

    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        errors.push("Username can only contain letters, numbers, underscores, and hyphens".to_string());
    }

    if username.starts_with('_') || username.starts_with('-') {
        errors.push("Username cannot start with underscore or hyphen".to_string());
    }

    if username.ends_with('_') || username.ends_with('-') {
        errors.push("Username cannot end with underscore or hyphen".to_string());
    }

    errors
}

fn no_store(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate, private"),
    );
    response
        .headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Response> {
    let username_errors = validate_username(&req.username);
    if !username_errors.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Invalid username: {}",
            username_errors.join(", ")
        )));
    }

    if req.password.len() < 6 {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(&req.username)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("Username already exists"));
    }

    let password_hash = hash(&req.password, DEFAULT_COST).context("Failed to hash password")?;

    // A concurrent registration still hits the unique index and maps to 409
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING *",
    )
    .bind(&req.username)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await?;

    let token = state
        .jwt_manager
        .generate_token(user.id, &user.username, user.role)?;

    info!("User registered successfully: {}", user.username);

    let body = Json(AuthResponse {
        token,
        user: user.into(),
    });
    Ok(no_store((StatusCode::CREATED, body).into_response()))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(&req.username)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(invalid)?;

    let is_valid = verify(&req.password, &user.password_hash).context("Failed to verify password")?;
    if !is_valid {
        warn!("Failed login attempt for {}", req.username);
        return Err(invalid());
    }

    let token = state
        .jwt_manager
        .generate_token(user.id, &user.username, user.role)?;

    info!("User logged in successfully: {}", user.username);

    let body = Json(AuthResponse {
        token,
        user: user.into(),
    });
    Ok(no_store(body.into_response()))
}

pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Response> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut response = no_store(Json(UserInfo::from(user)).into_response());
    response
        .headers_mut()
        .insert(header::EXPIRES, HeaderValue::from_static("0"));

    Ok(response)
}

/// Resolves a username to a user id, for endpoints addressed by name.
pub async fn find_user_id(state: &AppState, username: &str) -> ApiResult<Uuid> {
    sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}
