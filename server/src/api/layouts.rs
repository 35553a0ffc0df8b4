use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use common::Role;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::auth::find_user_id;
use super::jwt::AuthUser;
use super::levels::MessageResponse;
use crate::db::models::{Collaborator, Layout, LayoutDetail, LayoutStatus};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLayoutRequest {
    pub title: String,
    pub description: Option<String>,
    pub video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLayoutRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_id: Option<String>,
    pub status: Option<LayoutStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CollaboratorRequest {
    pub username: String,
}

async fn find_layout(state: &AppState, id: Uuid) -> ApiResult<Layout> {
    sqlx::query_as::<_, Layout>("SELECT * FROM layouts WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Layout not found"))
}

async fn is_collaborator(state: &AppState, layout_id: Uuid, user_id: Uuid) -> ApiResult<bool> {
    let found: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM layout_collaborators WHERE layout_id = $1 AND user_id = $2",
    )
    .bind(layout_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(found.is_some())
}

fn require_owner(layout: &Layout, user: &AuthUser) -> ApiResult<()> {
    if layout.owner_id == user.id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the layout owner can do that"))
    }
}

/// Newest first
pub async fn list_layouts(State(state): State<AppState>) -> ApiResult<Json<Vec<Layout>>> {
    let layouts = sqlx::query_as::<_, Layout>("SELECT * FROM layouts ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(layouts))
}

pub async fn get_layout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LayoutDetail>> {
    let layout = find_layout(&state, id).await?;

    let collaborators = sqlx::query_as::<_, Collaborator>(
        r#"
        SELECT lc.user_id, u.username, lc.added_at
        FROM layout_collaborators lc
        JOIN users u ON u.id = lc.user_id
        WHERE lc.layout_id = $1
        ORDER BY lc.added_at
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(LayoutDetail {
        layout,
        collaborators,
    }))
}

pub async fn create_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateLayoutRequest>,
) -> ApiResult<(StatusCode, Json<Layout>)> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }

    let layout = sqlx::query_as::<_, Layout>(
        r#"
        INSERT INTO layouts (owner_id, title, description, video_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.title.trim())
    .bind(req.description.as_deref())
    .bind(req.video_id.as_deref())
    .fetch_one(&state.db)
    .await?;

    info!("{} created layout {}", user.username, layout.id);
    Ok((StatusCode::CREATED, Json(layout)))
}

pub async fn update_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateLayoutRequest>,
) -> ApiResult<Json<Layout>> {
    let layout = find_layout(&state, id).await?;
    if layout.owner_id != user.id && !is_collaborator(&state, id, user.id).await? {
        return Err(ApiError::forbidden("Only the owner or a collaborator can edit this layout"));
    }
    if matches!(req.title.as_deref(), Some(title) if title.trim().is_empty()) {
        return Err(ApiError::bad_request("title must not be empty"));
    }

    let layout = sqlx::query_as::<_, Layout>(
        r#"
        UPDATE layouts SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            video_id = COALESCE($4, video_id),
            status = COALESCE($5, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref())
    .bind(req.video_id.as_deref())
    .bind(req.status.map(|s| s.as_str()))
    .fetch_one(&state.db)
    .await?;

    info!("{} updated layout {}", user.username, id);
    Ok(Json(layout))
}

pub async fn delete_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let layout = find_layout(&state, id).await?;
    if layout.owner_id != user.id {
        user.require(&[Role::Admin])?;
    }

    sqlx::query("DELETE FROM layouts WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!("{} deleted layout {}", user.username, id);
    Ok(Json(MessageResponse {
        message: format!("Layout {} deleted", layout.title),
    }))
}

pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<CollaboratorRequest>,
) -> ApiResult<(StatusCode, Json<Collaborator>)> {
    let layout = find_layout(&state, id).await?;
    require_owner(&layout, &user)?;

    let collaborator_id = find_user_id(&state, &req.username).await?;
    if collaborator_id == layout.owner_id {
        return Err(ApiError::bad_request("The owner is already part of this layout"));
    }

    let collaborator = sqlx::query_as::<_, Collaborator>(
        r#"
        WITH added AS (
            INSERT INTO layout_collaborators (layout_id, user_id)
            VALUES ($1, $2)
            RETURNING user_id, added_at
        )
        SELECT added.user_id, u.username, added.added_at
        FROM added
        JOIN users u ON u.id = added.user_id
        "#,
    )
    .bind(id)
    .bind(collaborator_id)
    .fetch_one(&state.db)
    .await?;

    info!("{} added {} to layout {}", user.username, collaborator.username, id);
    Ok((StatusCode::CREATED, Json(collaborator)))
}

pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, collaborator_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MessageResponse>> {
    let layout = find_layout(&state, id).await?;
    require_owner(&layout, &user)?;

    let result = sqlx::query(
        "DELETE FROM layout_collaborators WHERE layout_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(collaborator_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Collaborator not found"));
    }

    Ok(Json(MessageResponse {
        message: "Collaborator removed".to_string(),
    }))
}
