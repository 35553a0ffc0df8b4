use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::PlayerStat;
use crate::error::{ApiError, ApiResult};
use crate::http_server::AppState;

/// Query parameters for leaderboard endpoint
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// Number of entries to return (default: 25, max: 100)
    pub limit: Option<i64>,
    /// Offset for pagination (default: 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<PlayerStat>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Clamps paging to `1..=100` entries starting at a non-negative offset.
fn page_bounds(query: &LeaderboardQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(25).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Get ranked players
/// Query parameters:
/// - limit: optional, defaults to 25, max 100
/// - offset: optional, defaults to 0
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<LeaderboardResponse>> {
    let (limit, offset) = page_bounds(&query);

    // Fetch one extra to know whether another page exists
    let mut entries = sqlx::query_as::<_, PlayerStat>(
        r#"
        SELECT ps.user_id, u.username, ps.score, ps.rank,
               ps.hardest_level_id, ps.hardest_name, ps.hardest_placement, ps.updated_at
        FROM player_stats ps
        JOIN users u ON u.id = ps.user_id
        WHERE ps.rank IS NOT NULL
        ORDER BY ps.rank
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit + 1)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let has_more = entries.len() as i64 > limit;
    entries.truncate(limit as usize);

    Ok(Json(LeaderboardResponse { entries, has_more }))
}

/// `GET /api/players/:user_id/stats`
pub async fn get_player_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<PlayerStat>> {
    let stat = sqlx::query_as::<_, PlayerStat>(
        r#"
        SELECT ps.user_id, u.username, ps.score, ps.rank,
               ps.hardest_level_id, ps.hardest_name, ps.hardest_placement, ps.updated_at
        FROM player_stats ps
        JOIN users u ON u.id = ps.user_id
        WHERE ps.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Player has no stats yet"))?;

    Ok(Json(stat))
}
