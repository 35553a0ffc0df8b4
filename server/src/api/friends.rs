use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::auth::find_user_id;
use super::jwt::AuthUser;
use super::levels::MessageResponse;
use crate::db::models::{Friend, Friendship, FriendshipStatus};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;

#[derive(Debug, Deserialize)]
pub struct FriendRequest {
    pub username: String,
}

async fn find_friendship(state: &AppState, id: Uuid) -> ApiResult<Friendship> {
    sqlx::query_as::<_, Friendship>("SELECT * FROM friendships WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Friend request not found"))
}

/// Accepted friendships, seen from the caller's side
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Friend>>> {
    let friends = sqlx::query_as::<_, Friend>(
        r#"
        SELECT f.id AS friendship_id, u.id AS user_id, u.username, f.created_at AS since
        FROM friendships f
        JOIN users u ON u.id = CASE
            WHEN f.requester_id = $1 THEN f.addressee_id
            ELSE f.requester_id
        END
        WHERE f.status = 'ACCEPTED'
        AND (f.requester_id = $1 OR f.addressee_id = $1)
        ORDER BY u.username
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(friends))
}

/// Incoming requests still waiting on the caller
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Friend>>> {
    let requests = sqlx::query_as::<_, Friend>(
        r#"
        SELECT f.id AS friendship_id, u.id AS user_id, u.username, f.created_at AS since
        FROM friendships f
        JOIN users u ON u.id = f.requester_id
        WHERE f.status = 'PENDING' AND f.addressee_id = $1
        ORDER BY f.created_at
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<FriendRequest>,
) -> ApiResult<(StatusCode, Json<Friendship>)> {
    if req.username.eq_ignore_ascii_case(&user.username) {
        return Err(ApiError::bad_request("You cannot befriend yourself"));
    }
    let addressee = find_user_id(&state, &req.username).await?;

    // The pair index is unordered, so a request in either direction conflicts
    let friendship = sqlx::query_as::<_, Friendship>(
        r#"
        INSERT INTO friendships (requester_id, addressee_id)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(addressee)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("A friendship or request already exists"),
        other => other,
    })?;

    info!("{} sent a friend request to {}", user.username, req.username);
    Ok((StatusCode::CREATED, Json(friendship)))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Friendship>> {
    let friendship = find_friendship(&state, id).await?;

    if friendship.addressee_id != user.id {
        return Err(ApiError::forbidden("Only the recipient can accept a request"));
    }
    if friendship.status == FriendshipStatus::Accepted {
        return Err(ApiError::conflict("Friend request was already accepted"));
    }

    let friendship = sqlx::query_as::<_, Friendship>(
        "UPDATE friendships SET status = 'ACCEPTED' WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    info!("{} accepted friend request {}", user.username, id);
    Ok(Json(friendship))
}

/// Declines, cancels or ends a friendship depending on its state.
pub async fn remove_friendship(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let friendship = find_friendship(&state, id).await?;

    if friendship.requester_id != user.id && friendship.addressee_id != user.id {
        return Err(ApiError::forbidden("You are not part of this friendship"));
    }

    sqlx::query("DELETE FROM friendships WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    let message = match friendship.status {
        FriendshipStatus::Accepted => "Friend removed",
        FriendshipStatus::Pending if friendship.requester_id == user.id => "Friend request cancelled",
        FriendshipStatus::Pending => "Friend request declined",
    };
    info!("{}: {} ({})", user.username, message, id);

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}
