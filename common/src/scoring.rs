use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::{MAX_SCORED_PLACEMENT, POINTS_DECAY, TOP_PLACEMENT_POINTS};

/// Points for a 100% completion of the main-list level at `placement`.
///
/// Decays exponentially from 500 at placement 1; anything outside
/// `1..=150` is worth nothing.
pub fn points(placement: i32) -> f64 {
    if !(1..=MAX_SCORED_PLACEMENT).contains(&placement) {
        return 0.0;
    }
    TOP_PLACEMENT_POINTS * POINTS_DECAY.powi(placement - 1)
}

/// A user's completed record against some level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub level_id: Uuid,
    pub percent: i32,
}

/// Current main-list position of a level, keyed by level id in lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedLevel {
    pub name: String,
    pub placement: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardest {
    pub level_id: Uuid,
    pub name: String,
    pub placement: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tally {
    pub score: f64,
    pub hardest: Option<Hardest>,
}

/// Sums a user's points and finds their hardest main-list level.
///
/// Completions that do not reference a main-list level are ignored. Any
/// percentage counts toward the hardest level; only 100% earns points.
pub fn tally(completions: &[Completion], main_list: &HashMap<Uuid, RankedLevel>) -> Tally {
    let mut result = Tally::default();

    for completion in completions {
        let Some(level) = main_list.get(&completion.level_id) else {
            continue;
        };

        let is_harder = result
            .hardest
            .as_ref()
            .map_or(true, |hardest| level.placement < hardest.placement);
        if is_harder {
            result.hardest = Some(Hardest {
                level_id: completion.level_id,
                name: level.name.clone(),
                placement: level.placement,
            });
        }

        if completion.percent >= 100 {
            result.score += points(level.placement);
        }
    }

    result
}

/// One row of the global player leaderboard, as input to ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub user_id: Uuid,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Assigns ranks `1, 2, 3, …` by descending score, earlier update first on
/// ties. Players with a score of zero or less get no rank.
pub fn assign_ranks(standings: &[Standing]) -> Vec<(Uuid, Option<i32>)> {
    let mut ordered: Vec<&Standing> = standings.iter().collect();
    ordered.sort_by(|a, b| compare_standings(a, b));

    let mut next_rank = 0;
    ordered
        .into_iter()
        .map(|standing| {
            let rank = if standing.score > 0.0 {
                next_rank += 1;
                Some(next_rank)
            } else {
                None
            };
            (standing.user_id, rank)
        })
        .collect()
}

fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn main_list(levels: &[(Uuid, &str, i32)]) -> HashMap<Uuid, RankedLevel> {
        levels
            .iter()
            .map(|(id, name, placement)| {
                (
                    *id,
                    RankedLevel {
                        name: name.to_string(),
                        placement: *placement,
                    },
                )
            })
            .collect()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn test_points_curve() {
        assert_eq!(points(1), 500.0);
        assert!(points(2) < points(1));
        assert!(points(150) > 0.0);
        assert!(points(150) < 30.0);
        assert_eq!(points(151), 0.0);
        assert_eq!(points(0), 0.0);
        assert_eq!(points(-4), 0.0);
    }

    #[test]
    fn test_single_top_completion() {
        let top = Uuid::new_v4();
        let levels = main_list(&[(top, "Top", 1)]);
        let result = tally(&[Completion { level_id: top, percent: 100 }], &levels);

        assert_eq!(result.score, 500.0);
        let hardest = result.hardest.unwrap();
        assert_eq!(hardest.placement, 1);
        assert_eq!(hardest.name, "Top");
    }

    #[test]
    fn test_partial_progress_counts_for_hardest_only() {
        let top = Uuid::new_v4();
        let tenth = Uuid::new_v4();
        let levels = main_list(&[(top, "Top", 1), (tenth, "Tenth", 10)]);
        let result = tally(
            &[
                Completion { level_id: tenth, percent: 100 },
                Completion { level_id: top, percent: 64 },
            ],
            &levels,
        );

        assert!((result.score - points(10)).abs() < 1e-9);
        assert_eq!(result.hardest.unwrap().placement, 1);
    }

    #[test]
    fn test_off_list_completions_ignored() {
        let levels = main_list(&[(Uuid::new_v4(), "Listed", 3)]);
        let result = tally(
            &[Completion { level_id: Uuid::new_v4(), percent: 100 }],
            &levels,
        );

        assert_eq!(result, Tally::default());
    }

    #[test]
    fn test_ranks_follow_score_then_update_time() {
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let standings = vec![
            Standing { user_id: a, score: 120.0, updated_at: at(5) },
            Standing { user_id: b, score: 0.0, updated_at: at(0) },
            Standing { user_id: c, score: 480.5, updated_at: at(9) },
            Standing { user_id: d, score: 120.0, updated_at: at(1) },
        ];
        let ranks: HashMap<Uuid, Option<i32>> = assign_ranks(&standings).into_iter().collect();

        assert_eq!(ranks[&c], Some(1));
        assert_eq!(ranks[&d], Some(2));
        assert_eq!(ranks[&a], Some(3));
        assert_eq!(ranks[&b], None);
    }

    #[test]
    fn test_higher_score_always_ranks_first() {
        let standings: Vec<Standing> = (0..40)
            .map(|i| Standing {
                user_id: Uuid::new_v4(),
                score: ((i * 37) % 11) as f64 * 12.5 - 25.0,
                updated_at: at(i),
            })
            .collect();
        let ranks: HashMap<Uuid, Option<i32>> = assign_ranks(&standings).into_iter().collect();

        for x in &standings {
            for y in &standings {
                if x.score > y.score && y.score > 0.0 {
                    assert!(ranks[&x.user_id].unwrap() < ranks[&y.user_id].unwrap());
                }
            }
            if x.score <= 0.0 {
                assert_eq!(ranks[&x.user_id], None);
            }
        }
    }
}
