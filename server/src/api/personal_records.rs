//! A user's own ranked list of completions and attempts.
//!
//! Placements are kept contiguous per user with the same shift plans the
//! public lists use. Completed entries that reference a main-list level feed
//! the player's score, so every write re-scores the owner.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use common::placement;
use serde::{Deserialize, Deserializer};
use sqlx::postgres::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::AuthUser;
use super::levels::MessageResponse;
use crate::db::{
    self,
    models::{PersonalRecord, RecordStatus},
};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;
use crate::scores::RecomputeScope;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub level_name: String,
    pub level_id: Option<Uuid>,
    pub placement: i32,
    pub percent: i32,
    pub status: RecordStatus,
    pub video_id: Option<String>,
    pub attempts: Option<i32>,
}

/// Every field is optional; omitted fields keep their value. The nullable
/// columns are cleared by sending an explicit `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    pub level_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub level_id: Option<Option<Uuid>>,
    pub placement: Option<i32>,
    pub percent: Option<i32>,
    pub status: Option<RecordStatus>,
    #[serde(default, deserialize_with = "present")]
    pub video_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub attempts: Option<Option<i32>>,
}

/// Tells a field sent as `null` (`Some(None)`) apart from one left out (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_fields(
    level_name: Option<&str>,
    placement: Option<i32>,
    percent: Option<i32>,
    attempts: Option<i32>,
) -> ApiResult<()> {
    if matches!(level_name, Some(name) if name.trim().is_empty()) {
        return Err(ApiError::bad_request("levelName must not be empty"));
    }
    if matches!(placement, Some(p) if p < 1) {
        return Err(ApiError::bad_request("placement must be at least 1"));
    }
    if matches!(percent, Some(p) if !(1..=100).contains(&p)) {
        return Err(ApiError::bad_request("percent must be between 1 and 100"));
    }
    if matches!(attempts, Some(a) if a < 0) {
        return Err(ApiError::bad_request("attempts must not be negative"));
    }
    Ok(())
}

async fn lock_owned(conn: &mut PgConnection, id: Uuid, user: &AuthUser) -> ApiResult<PersonalRecord> {
    let record = sqlx::query_as::<_, PersonalRecord>(
        "SELECT * FROM personal_records WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Record not found"))?;

    if record.user_id != user.id {
        warn!("{} tried to modify personal record {} they do not own", user.username, id);
        return Err(ApiError::forbidden("You can only modify your own records"));
    }
    Ok(record)
}

async fn fetch_for_user(state: &AppState, user_id: Uuid) -> ApiResult<Vec<PersonalRecord>> {
    let records = sqlx::query_as::<_, PersonalRecord>(
        "SELECT * FROM personal_records WHERE user_id = $1 ORDER BY placement",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(records)
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PersonalRecord>>> {
    Ok(Json(fetch_for_user(&state, user.id).await?))
}

/// `GET /api/users/:user_id/personal-records`
pub async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PersonalRecord>>> {
    Ok(Json(fetch_for_user(&state, user_id).await?))
}

pub async fn create_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateRecordRequest>,
) -> ApiResult<(StatusCode, Json<PersonalRecord>)> {
    validate_fields(
        Some(&req.level_name),
        Some(req.placement),
        Some(req.percent),
        req.attempts,
    )?;

    let mut tx = state.db.begin().await?;

    let len = db::personal_list_len(&mut tx, user.id).await?;
    let target = placement::clamp_insert(req.placement, len);
    db::shift_personal_records(&mut tx, user.id, placement::insert_shift(target)).await?;

    let record = sqlx::query_as::<_, PersonalRecord>(
        r#"
        INSERT INTO personal_records
            (user_id, level_name, level_id, placement, percent, status, video_id, attempts)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.level_name.trim())
    .bind(req.level_id)
    .bind(target)
    .bind(req.percent)
    .bind(req.status.as_str())
    .bind(req.video_id.as_deref())
    .bind(req.attempts)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "{} added personal record {} at #{}",
        user.username, record.id, record.placement
    );
    state.scores.spawn_recompute(RecomputeScope::Users(vec![user.id]));

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateRecordRequest>,
) -> ApiResult<Json<PersonalRecord>> {
    validate_fields(
        req.level_name.as_deref(),
        req.placement,
        req.percent,
        req.attempts.flatten(),
    )?;

    let mut tx = state.db.begin().await?;
    let record = lock_owned(&mut tx, id, &user).await?;

    let mut new_placement = record.placement;
    if let Some(requested) = req.placement {
        let len = db::personal_list_len(&mut tx, user.id).await?;
        new_placement = placement::clamp_move(requested, len);
        if let Some(shift) = placement::move_shift(record.placement, new_placement) {
            db::shift_personal_records(&mut tx, user.id, shift).await?;
        }
    }

    let updated = sqlx::query_as::<_, PersonalRecord>(
        r#"
        UPDATE personal_records SET
            level_name = COALESCE($2, level_name),
            level_id = CASE WHEN $3 THEN $4 ELSE level_id END,
            placement = $5,
            percent = COALESCE($6, percent),
            status = COALESCE($7, status),
            video_id = CASE WHEN $8 THEN $9 ELSE video_id END,
            attempts = CASE WHEN $10 THEN $11 ELSE attempts END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.level_name.as_deref().map(str::trim))
    .bind(req.level_id.is_some())
    .bind(req.level_id.flatten())
    .bind(new_placement)
    .bind(req.percent)
    .bind(req.status.map(|s| s.as_str()))
    .bind(req.video_id.is_some())
    .bind(req.video_id.as_ref().and_then(|v| v.as_deref()))
    .bind(req.attempts.is_some())
    .bind(req.attempts.flatten())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "{} updated personal record {} (#{} -> #{})",
        user.username, id, record.placement, updated.placement
    );
    state.scores.spawn_recompute(RecomputeScope::Users(vec![user.id]));

    Ok(Json(updated))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let mut tx = state.db.begin().await?;
    let record = lock_owned(&mut tx, id, &user).await?;

    sqlx::query("DELETE FROM personal_records WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    db::shift_personal_records(&mut tx, user.id, placement::remove_shift(record.placement)).await?;

    tx.commit().await?;

    info!(
        "{} deleted personal record {} from #{}",
        user.username, id, record.placement
    );
    state.scores.spawn_recompute(RecomputeScope::Users(vec![user.id]));

    Ok(Json(MessageResponse {
        message: format!("{} has been removed from your list", record.level_name),
    }))
}
