use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::history::{self, ChangeRecord, HistoricLevel};
use common::ListTag;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::jwt::AuthUser;
use crate::db::models::{Level, LevelDetail, LevelRecord, ListChange};
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::http_server::AppState;
use crate::reorder::NewLevel;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// List tag, defaults to the main list
    pub list: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
    pub list: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub list: ListTag,
    pub date: NaiveDate,
    pub levels: Vec<HistoricLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertLevelRequest {
    pub level_data: Option<NewLevel>,
    pub list: Option<String>,
    pub placement: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveLevelRequest {
    pub level_id: Option<Uuid>,
    pub new_placement: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveLevelRequest {
    pub level_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn parse_list(raw: Option<&str>) -> ApiResult<ListTag> {
    match raw {
        None => Ok(ListTag::Main),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Unknown list: {}", raw))),
    }
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_history_date(raw: &str) -> ApiResult<NaiveDate> {
    let invalid = || ApiError::bad_request("date must be formatted as YYYY-MM-DD");
    if raw.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

/// Changes at or after this instant happened after `date` ended.
fn history_cutoff(date: NaiveDate) -> DateTime<Utc> {
    (date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn fetch_list(state: &AppState, list: ListTag) -> ApiResult<Vec<Level>> {
    let levels = sqlx::query_as::<_, Level>(
        "SELECT * FROM levels WHERE list = $1 ORDER BY placement",
    )
    .bind(list.as_str())
    .fetch_all(&state.db)
    .await?;
    Ok(levels)
}

/// `GET /api/levels?list=main`
pub async fn list_levels(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Level>>> {
    let list = parse_list(query.list.as_deref())?;
    Ok(Json(fetch_list(&state, list).await?))
}

/// `GET /api/levels/:id` where `id` is either the level's uuid or its in-game id.
pub async fn get_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LevelDetail>> {
    let level = if let Ok(uuid) = id.parse::<Uuid>() {
        sqlx::query_as::<_, Level>("SELECT * FROM levels WHERE id = $1")
            .bind(uuid)
            .fetch_optional(&state.db)
            .await?
    } else if let Ok(game_id) = id.parse::<i32>() {
        sqlx::query_as::<_, Level>("SELECT * FROM levels WHERE level_id = $1")
            .bind(game_id)
            .fetch_optional(&state.db)
            .await?
    } else {
        return Err(ApiError::bad_request("Level id must be a uuid or a numeric level id"));
    };

    let level = level.ok_or_else(|| ApiError::not_found("Level not found"))?;

    let records = sqlx::query_as::<_, LevelRecord>(
        r#"
        SELECT id, username, percent, video_id, created_at
        FROM level_records
        WHERE level_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(level.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(LevelDetail { level, records }))
}

/// `GET /api/levels/history?date=YYYY-MM-DD&list=main`
///
/// Best-effort: the list is rebuilt by undoing later changes, so stubs may
/// stand in for removed levels and overlapping edits may not invert cleanly.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let raw_date = query
        .date
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("date is required"))?;
    let date = parse_history_date(raw_date)?;
    let list = parse_list(query.list.as_deref())?;

    let current: Vec<HistoricLevel> = fetch_list(&state, list)
        .await?
        .into_iter()
        .map(HistoricLevel::from)
        .collect();

    let changes: Vec<ChangeRecord> = sqlx::query_as::<_, ListChange>(
        r#"
        SELECT * FROM list_changes
        WHERE list = $1 AND created_at >= $2
        ORDER BY id DESC
        "#,
    )
    .bind(list.as_str())
    .bind(history_cutoff(date))
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(ChangeRecord::from)
    .collect();

    let mut levels = history::reconstruct(current, &changes);
    levels.truncate(list.max_len() as usize);

    Ok(Json(HistoryResponse { list, date, levels }))
}

/// `POST /api/levels` (admin)
pub async fn insert_level(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<InsertLevelRequest>,
) -> ApiResult<(StatusCode, Json<Level>)> {
    user.require_admin()?;

    let (Some(data), Some(raw_list), Some(placement)) = (req.level_data, req.list, req.placement)
    else {
        return Err(ApiError::bad_request("levelData, list and placement are required"));
    };
    let list = parse_list(Some(&raw_list))?;

    let level = state.reorder.insert(list, placement, data).await?;
    info!("{} added {} to the {} list", user.username, level.id, list);

    Ok((StatusCode::CREATED, Json(level)))
}

/// `PUT /api/levels` (admin)
pub async fn move_level(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<MoveLevelRequest>,
) -> ApiResult<Json<Level>> {
    user.require_admin()?;

    let (Some(level_id), Some(new_placement)) = (req.level_id, req.new_placement) else {
        return Err(ApiError::bad_request("levelId and newPlacement are required"));
    };

    let level = state.reorder.move_level(level_id, new_placement).await?;
    Ok(Json(level))
}

/// `DELETE /api/levels` (admin)
pub async fn remove_level(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<RemoveLevelRequest>,
) -> ApiResult<Json<MessageResponse>> {
    user.require_admin()?;

    let level_id = req
        .level_id
        .ok_or_else(|| ApiError::bad_request("levelId is required"))?;

    let message = state.reorder.remove(level_id).await?;
    Ok(Json(MessageResponse { message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_date_must_be_strict() {
        assert_eq!(
            parse_history_date("2024-03-09").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
        assert!(parse_history_date("2024-3-9").is_err());
        assert!(parse_history_date("09/03/2024").is_err());
        assert!(parse_history_date("2024-02-30").is_err());
        assert!(parse_history_date("").is_err());
    }

    #[test]
    fn test_history_cutoff_is_next_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(history_cutoff(date).to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_list_defaults_to_main() {
        assert_eq!(parse_list(None).unwrap(), ListTag::Main);
        assert_eq!(parse_list(Some("unrated")).unwrap(), ListTag::Unrated);
        assert!(parse_list(Some("legacy")).is_err());
    }
}
