use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::postgres::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::AuthUser;
use super::levels::MessageResponse;
use crate::db::models::{Submission, SubmissionStatus};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    pub level_id: Uuid,
    pub percent: i32,
    pub video_id: String,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub note: Option<String>,
}

fn validate_percent(percent: i32) -> ApiResult<()> {
    if (1..=100).contains(&percent) {
        Ok(())
    } else {
        Err(ApiError::bad_request("percent must be between 1 and 100"))
    }
}

/// Locks a submission that is still awaiting review.
async fn lock_pending(conn: &mut PgConnection, id: Uuid) -> ApiResult<Submission> {
    let submission = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Submission not found"))?;

    if submission.status != SubmissionStatus::Pending {
        return Err(ApiError::conflict(format!(
            "Submission was already {}",
            submission.status.as_str().to_lowercase()
        )));
    }
    Ok(submission)
}

pub async fn create_submission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateSubmissionRequest>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    validate_percent(req.percent)?;
    if req.video_id.trim().is_empty() {
        return Err(ApiError::bad_request("videoId is required"));
    }

    let level_exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM levels WHERE id = $1")
        .bind(req.level_id)
        .fetch_optional(&state.db)
        .await?;
    if level_exists.is_none() {
        return Err(ApiError::not_found("Level not found"));
    }

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions (user_id, level_id, percent, video_id, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.level_id)
    .bind(req.percent)
    .bind(req.video_id.trim())
    .bind(req.comment.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::conflict("You already have a pending submission for this level")
        }
        other => other,
    })?;

    info!(
        "User {} submitted {}% on level {}",
        user.username, submission.percent, submission.level_id
    );
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Submission>>> {
    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(submissions))
}

/// Review queue, oldest first
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Submission>>> {
    user.require_reviewer()?;

    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE status = 'PENDING' ORDER BY created_at, id",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(submissions))
}

/// Approves a pending submission and appends it to the level's records.
pub async fn approve_submission(
    State(state): State<AppState>,
    Extension(reviewer): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Submission>> {
    reviewer.require_reviewer()?;

    let mut tx = state.db.begin().await?;
    let pending = lock_pending(&mut tx, id).await?;

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        UPDATE submissions
        SET status = 'APPROVED', reviewer_id = $2, reviewed_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(pending.id)
    .bind(reviewer.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO level_records (level_id, username, percent, video_id)
        SELECT $1, u.username, $2, $3
        FROM users u
        WHERE u.id = $4
        "#,
    )
    .bind(submission.level_id)
    .bind(submission.percent)
    .bind(&submission.video_id)
    .bind(submission.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "{} approved submission {} on level {}",
        reviewer.username, submission.id, submission.level_id
    );
    Ok(Json(submission))
}

pub async fn reject_submission(
    State(state): State<AppState>,
    Extension(reviewer): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<ApiJson<RejectRequest>>,
) -> ApiResult<Json<Submission>> {
    reviewer.require_reviewer()?;
    let note = body.and_then(|ApiJson(req)| req.note);

    let mut tx = state.db.begin().await?;
    let pending = lock_pending(&mut tx, id).await?;

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        UPDATE submissions
        SET status = 'REJECTED', reviewer_id = $2, review_note = $3, reviewed_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(pending.id)
    .bind(reviewer.id)
    .bind(note.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("{} rejected submission {}", reviewer.username, submission.id);
    Ok(Json(submission))
}

/// Owners may withdraw a submission until it has been reviewed.
pub async fn delete_submission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let mut tx = state.db.begin().await?;
    let pending = lock_pending(&mut tx, id).await?;

    if pending.user_id != user.id {
        warn!("{} tried to delete submission {} they do not own", user.username, id);
        return Err(ApiError::forbidden("You can only delete your own submissions"));
    }

    sqlx::query("DELETE FROM submissions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(MessageResponse {
        message: "Submission deleted".to_string(),
    }))
}
