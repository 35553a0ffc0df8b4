//! Player score recomputation.
//!
//! Scores are rebuilt for a chosen set of users, then every player's rank is
//! rewritten, since any single score change can move everyone else.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::scoring::{self, Completion, RankedLevel, Standing};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Which users need their score rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeScope {
    /// Everyone with a qualifying completion or an existing stat row
    All,
    Users(Vec<Uuid>),
    /// Users with completions on main-list levels now placed in `from..=to`
    Placements { from: i32, to: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecomputeSummary {
    pub users_scored: usize,
    pub users_failed: usize,
    pub players_ranked: usize,
}

#[derive(Clone)]
pub struct ScoreEngine {
    pool: PgPool,
}

impl ScoreEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs [`ScoreEngine::recompute`] on a background task; failures are logged.
    pub fn spawn_recompute(&self, scope: RecomputeScope) {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.recompute(scope.clone()).await {
                Ok(summary) => debug!("Score recomputation for {:?} finished: {:?}", scope, summary),
                Err(e) => error!("Score recomputation for {:?} failed: {:?}", scope, e),
            }
        });
    }

    pub async fn recompute(&self, scope: RecomputeScope) -> Result<RecomputeSummary> {
        let main_list = self.load_main_list().await?;
        let users = self.resolve_users(&scope).await?;
        let mut completions = self.load_completions(&users).await?;

        let mut summary = RecomputeSummary::default();

        for user_id in users {
            let user_completions = completions.remove(&user_id).unwrap_or_default();
            let tally = scoring::tally(&user_completions, &main_list);

            // One failed user must not block the others
            match self.upsert_stat(user_id, &tally).await {
                Ok(()) => summary.users_scored += 1,
                Err(e) => {
                    error!("Failed to store score for user {}: {:?}", user_id, e);
                    summary.users_failed += 1;
                }
            }
        }

        summary.players_ranked = self.rerank().await?;

        info!(
            "Recomputed {} scores ({} failed), ranked {} players",
            summary.users_scored, summary.users_failed, summary.players_ranked
        );
        Ok(summary)
    }

    async fn load_main_list(&self) -> Result<HashMap<Uuid, RankedLevel>> {
        let rows: Vec<(Uuid, String, i32)> =
            sqlx::query_as("SELECT id, name, placement FROM levels WHERE list = 'main'")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load main list placements")?;

        Ok(rows
            .into_iter()
            .map(|(id, name, placement)| (id, RankedLevel { name, placement }))
            .collect())
    }

    async fn resolve_users(&self, scope: &RecomputeScope) -> Result<Vec<Uuid>> {
        let users = match scope {
            RecomputeScope::Users(users) => {
                let mut users = users.clone();
                users.sort();
                users.dedup();
                users
            }
            RecomputeScope::All => sqlx::query_scalar(
                r#"
                SELECT user_id FROM personal_records
                WHERE status = 'COMPLETED' AND level_id IS NOT NULL
                UNION
                SELECT user_id FROM player_stats
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .context("Failed to load users with completions")?,
            RecomputeScope::Placements { from, to } => sqlx::query_scalar(
                r#"
                SELECT DISTINCT pr.user_id
                FROM personal_records pr
                JOIN levels l ON l.id = pr.level_id
                WHERE pr.status = 'COMPLETED'
                AND l.list = 'main'
                AND l.placement BETWEEN $1 AND $2
                "#,
            )
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load users with completions in range")?,
        };

        Ok(users)
    }

    async fn load_completions(&self, users: &[Uuid]) -> Result<HashMap<Uuid, Vec<Completion>>> {
        if users.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, Uuid, i32)> = sqlx::query_as(
            r#"
            SELECT user_id, level_id, percent
            FROM personal_records
            WHERE user_id = ANY($1)
            AND status = 'COMPLETED'
            AND level_id IS NOT NULL
            "#,
        )
        .bind(users)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load completions")?;

        let mut completions: HashMap<Uuid, Vec<Completion>> = HashMap::new();
        for (user_id, level_id, percent) in rows {
            completions
                .entry(user_id)
                .or_default()
                .push(Completion { level_id, percent });
        }
        Ok(completions)
    }

    async fn upsert_stat(&self, user_id: Uuid, tally: &scoring::Tally) -> Result<()> {
        let hardest = tally.hardest.as_ref();

        sqlx::query(
            r#"
            INSERT INTO player_stats
                (user_id, score, hardest_level_id, hardest_name, hardest_placement, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                score = EXCLUDED.score,
                hardest_level_id = EXCLUDED.hardest_level_id,
                hardest_name = EXCLUDED.hardest_name,
                hardest_placement = EXCLUDED.hardest_placement,
                updated_at = CASE
                    WHEN player_stats.score IS DISTINCT FROM EXCLUDED.score THEN NOW()
                    ELSE player_stats.updated_at
                END
            "#,
        )
        .bind(user_id)
        .bind(tally.score)
        .bind(hardest.map(|h| h.level_id))
        .bind(hardest.map(|h| h.name.clone()))
        .bind(hardest.map(|h| h.placement))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert player stat for {}", user_id))?;

        Ok(())
    }

    /// Rewrites every player's rank in one transaction. Returns how many
    /// players hold a rank afterwards.
    pub async fn rerank(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(Uuid, f64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, score, updated_at FROM player_stats FOR UPDATE",
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load player stats")?;

        let standings: Vec<Standing> = rows
            .into_iter()
            .map(|(user_id, score, updated_at)| Standing {
                user_id,
                score,
                updated_at,
            })
            .collect();

        let (user_ids, ranks): (Vec<Uuid>, Vec<Option<i32>>) =
            scoring::assign_ranks(&standings).into_iter().unzip();
        let ranked = ranks.iter().filter(|rank| rank.is_some()).count();

        sqlx::query(
            r#"
            UPDATE player_stats AS ps
            SET rank = data.rank
            FROM UNNEST($1::uuid[], $2::int4[]) AS data(user_id, rank)
            WHERE ps.user_id = data.user_id
            "#,
        )
        .bind(&user_ids)
        .bind(&ranks)
        .execute(&mut *tx)
        .await
        .context("Failed to write player ranks")?;

        tx.commit().await?;
        Ok(ranked)
    }
}
