//! Insert, move and remove levels on a ranked list.
//!
//! Each operation runs in one transaction: shift the affected placements,
//! write the level, append one `list_changes` row and drop whatever now sits
//! past the list's maximum length, auditing each drop as a removal. Score recomputation is spawned after
//! commit for the main list.

use common::placement;
use common::{ChangeKind, ListTag};
use serde::Deserialize;
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, models::Level};
use crate::error::{ApiError, ApiResult};
use crate::scores::{RecomputeScope, ScoreEngine};

/// Level fields supplied by an admin when adding to a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLevel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub verifier: String,
    #[serde(default)]
    pub video_id: String,
    pub level_id: Option<i32>,
    pub description: Option<String>,
}

impl NewLevel {
    fn validate(&self) -> ApiResult<()> {
        let missing: Vec<&str> = [
            ("name", &self.name),
            ("creator", &self.creator),
            ("verifier", &self.verifier),
            ("videoId", &self.video_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            return Err(ApiError::bad_request(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if matches!(self.level_id, Some(id) if id <= 0) {
            return Err(ApiError::bad_request("levelId must be positive"));
        }
        Ok(())
    }
}

/// Human-readable audit text; placements are also stored in their own columns.
pub fn describe_change(
    kind: ChangeKind,
    name: &str,
    old_placement: Option<i32>,
    new_placement: Option<i32>,
) -> String {
    match (kind, old_placement, new_placement) {
        (ChangeKind::Add, _, Some(new)) => format!("{} has been placed at #{}", name, new),
        (ChangeKind::Remove, Some(old), _) => format!("{} has been removed from #{}", name, old),
        (ChangeKind::Move, Some(old), Some(new)) if new < old => {
            format!("{} has been raised from #{} to #{}", name, old, new)
        }
        (ChangeKind::Move, Some(old), Some(new)) => {
            format!("{} has been lowered from #{} to #{}", name, old, new)
        }
        (kind, _, _) => format!("{} {}", name, kind.as_str().to_lowercase()),
    }
}

async fn record_change(
    conn: &mut PgConnection,
    kind: ChangeKind,
    level: &Level,
    old_placement: Option<i32>,
    new_placement: Option<i32>,
) -> sqlx::Result<()> {
    let description = describe_change(kind, &level.name, old_placement, new_placement);
    insert_change(conn, kind, &description, level, old_placement, new_placement).await
}

async fn insert_change(
    conn: &mut PgConnection,
    kind: ChangeKind,
    description: &str,
    level: &Level,
    old_placement: Option<i32>,
    new_placement: Option<i32>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO list_changes
            (kind, description, level_id, level_name, old_placement, new_placement, list)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(kind.as_str())
    .bind(description)
    .bind(level.id)
    .bind(&level.name)
    .bind(old_placement)
    .bind(new_placement)
    .bind(level.list.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

/// Deletes levels placed past the list's maximum length and audits each one
/// as a removal from the placement it was pushed to.
///
/// Rows are written bottom-up so that undoing them newest-first puts the
/// highest placement back last.
async fn truncate_list(conn: &mut PgConnection, list: ListTag) -> sqlx::Result<Vec<Level>> {
    let mut dropped = sqlx::query_as::<_, Level>(
        "DELETE FROM levels WHERE list = $1 AND placement > $2 RETURNING *",
    )
    .bind(list.as_str())
    .bind(list.max_len())
    .fetch_all(&mut *conn)
    .await?;

    dropped.sort_by_key(|level| std::cmp::Reverse(level.placement));
    for level in &dropped {
        let description = describe_drop(&level.name, level.placement);
        insert_change(conn, ChangeKind::Remove, &description, level, Some(level.placement), None)
            .await?;
    }

    if !dropped.is_empty() {
        info!(
            "Dropped {} level(s) past #{} from the {} list",
            dropped.len(),
            list.max_len(),
            list
        );
    }
    Ok(dropped)
}

pub fn describe_drop(name: &str, placement: i32) -> String {
    format!("{} has been pushed off the list from #{}", name, placement)
}

async fn lock_level(conn: &mut PgConnection, id: Uuid) -> ApiResult<Level> {
    sqlx::query_as::<_, Level>("SELECT * FROM levels WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Level not found"))
}

#[derive(Clone)]
pub struct ReorderEngine {
    pool: PgPool,
    scores: ScoreEngine,
}

impl ReorderEngine {
    pub fn new(pool: PgPool, scores: ScoreEngine) -> Self {
        Self { pool, scores }
    }

    /// Adds a level at `placement`, pushing everything at or below it down one.
    pub async fn insert(&self, list: ListTag, placement: i32, data: NewLevel) -> ApiResult<Level> {
        data.validate()?;
        if placement < 1 {
            return Err(ApiError::bad_request("placement must be at least 1"));
        }

        let mut tx = self.pool.begin().await?;

        let len = db::list_len(&mut tx, list).await?;
        let target = placement::clamp_insert(placement, len);
        db::shift_levels(&mut tx, list, placement::insert_shift(target)).await?;

        let level = sqlx::query_as::<_, Level>(
            r#"
            INSERT INTO levels
                (name, creator, verifier, video_id, level_id, description, list, placement)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.name.trim())
        .bind(data.creator.trim())
        .bind(data.verifier.trim())
        .bind(data.video_id.trim())
        .bind(data.level_id)
        .bind(data.description.as_deref())
        .bind(list.as_str())
        .bind(target)
        .fetch_one(&mut *tx)
        .await?;

        record_change(&mut tx, ChangeKind::Add, &level, None, Some(target)).await?;
        let dropped = truncate_list(&mut tx, list).await?;

        tx.commit().await?;

        if target > list.max_len() {
            warn!(
                "Level {} was added at #{} past the end of the {} list and dropped",
                level.id, target, list
            );
        }
        info!("Added level {} ({}) to the {} list at #{}", level.name, level.id, list, target);

        if list.is_scored() {
            let scope = if !dropped.is_empty() {
                RecomputeScope::All
            } else {
                RecomputeScope::Placements {
                    from: target,
                    to: list.max_len(),
                }
            };
            self.scores.spawn_recompute(scope);
        }

        Ok(level)
    }

    /// Moves a level to `new_placement`, shifting the span between its old and
    /// new placement by one. Moving a level onto its own placement is a no-op.
    pub async fn move_level(&self, level_id: Uuid, new_placement: i32) -> ApiResult<Level> {
        if new_placement < 1 {
            return Err(ApiError::bad_request("newPlacement must be at least 1"));
        }

        let mut tx = self.pool.begin().await?;

        let level = lock_level(&mut tx, level_id).await?;
        let list = level.list;
        let old = level.placement;
        let len = db::list_len(&mut tx, list).await?;
        let new = placement::clamp_move(new_placement, len);

        let Some(shift) = placement::move_shift(old, new) else {
            // Nothing to write; dropping the transaction rolls it back
            return Ok(level);
        };

        db::shift_levels(&mut tx, list, shift).await?;

        let moved = sqlx::query_as::<_, Level>(
            "UPDATE levels SET placement = $1 WHERE id = $2 RETURNING *",
        )
        .bind(new)
        .bind(level_id)
        .fetch_one(&mut *tx)
        .await?;

        record_change(&mut tx, ChangeKind::Move, &moved, Some(old), Some(new)).await?;
        let dropped = truncate_list(&mut tx, list).await?;

        tx.commit().await?;

        info!(
            "Moved level {} ({}) on the {} list from #{} to #{}",
            moved.name, moved.id, list, old, new
        );

        if list.is_scored() {
            self.scores.spawn_recompute(move_scope(old, new, !dropped.is_empty()));
        }

        Ok(moved)
    }

    /// Removes a level and closes the gap it leaves.
    pub async fn remove(&self, level_id: Uuid) -> ApiResult<String> {
        let mut tx = self.pool.begin().await?;

        let level = lock_level(&mut tx, level_id).await?;
        record_change(&mut tx, ChangeKind::Remove, &level, Some(level.placement), None).await?;

        sqlx::query("DELETE FROM levels WHERE id = $1")
            .bind(level.id)
            .execute(&mut *tx)
            .await?;
        db::shift_levels(&mut tx, level.list, placement::remove_shift(level.placement)).await?;

        tx.commit().await?;

        info!(
            "Removed level {} ({}) from #{} on the {} list",
            level.name, level.id, level.placement, level.list
        );

        if level.list.is_scored() {
            // Completions of the removed level lose their reference, so the
            // affected users can no longer be found by placement.
            self.scores.spawn_recompute(RecomputeScope::All);
        }

        Ok(format!(
            "{} has been removed from the {} list",
            level.name, level.list
        ))
    }
}

fn move_scope(old: i32, new: i32, truncated: bool) -> RecomputeScope {
    if truncated {
        return RecomputeScope::All;
    }
    RecomputeScope::Placements {
        from: old.min(new),
        to: old.max(new),
    }
}
