//! Best-effort reconstruction of a list as it stood at a past date.
//!
//! Changes made after the target date are undone newest-first against the
//! current snapshot. Overlapping edits on the same placement range do not
//! always invert cleanly, so the result is renumbered to `1..=N` at the end.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lists::ChangeKind;
use crate::placement::{self, Placed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricLevel {
    pub id: Uuid,
    pub name: String,
    pub creator: String,
    pub verifier: String,
    pub video_id: String,
    pub placement: i32,
    /// Rebuilt from a removal entry; only `id`, `name` and `placement` are real.
    pub reconstructed: bool,
}

impl HistoricLevel {
    fn stub(id: Uuid, name: &str, placement: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            creator: String::new(),
            verifier: String::new(),
            video_id: String::new(),
            placement,
            reconstructed: true,
        }
    }
}

impl Placed for HistoricLevel {
    fn placement(&self) -> i32 {
        self.placement
    }

    fn set_placement(&mut self, placement: i32) {
        self.placement = placement;
    }
}

/// The parts of an audit entry needed to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub level_id: Uuid,
    pub level_name: String,
    pub old_placement: Option<i32>,
    pub new_placement: Option<i32>,
}

/// Undoes `changes` (newest first) against `current` and renumbers the result.
pub fn reconstruct(current: Vec<HistoricLevel>, changes: &[ChangeRecord]) -> Vec<HistoricLevel> {
    let mut levels = current;

    for change in changes {
        undo(&mut levels, change);
    }

    placement::renumber(&mut levels);
    levels
}

fn undo(levels: &mut Vec<HistoricLevel>, change: &ChangeRecord) {
    match change.kind {
        ChangeKind::Add => {
            let Some(added_at) = change.new_placement else {
                return;
            };
            levels.retain(|level| level.id != change.level_id);
            placement::remove_shift(added_at).apply(levels);
        }
        ChangeKind::Remove => {
            let Some(removed_from) = change.old_placement else {
                return;
            };
            placement::insert(
                levels,
                HistoricLevel::stub(change.level_id, &change.level_name, removed_from),
            );
        }
        ChangeKind::Move => {
            let (Some(old), Some(new)) = (change.old_placement, change.new_placement) else {
                return;
            };
            let Some(shift) = placement::move_shift(new, old) else {
                return;
            };
            let moved = levels.iter().position(|level| level.id == change.level_id);
            shift.apply(levels);
            if let Some(index) = moved {
                levels[index].placement = old;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::is_contiguous;

    fn level(name: &str, placement: i32) -> HistoricLevel {
        HistoricLevel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            creator: "creator".to_string(),
            verifier: "verifier".to_string(),
            video_id: "video".to_string(),
            placement,
            reconstructed: false,
        }
    }

    fn names(levels: &[HistoricLevel]) -> Vec<&str> {
        levels.iter().map(|level| level.name.as_str()).collect()
    }

    fn change(
        kind: ChangeKind,
        target: &HistoricLevel,
        old: Option<i32>,
        new: Option<i32>,
    ) -> ChangeRecord {
        ChangeRecord {
            kind,
            level_id: target.id,
            level_name: target.name.clone(),
            old_placement: old,
            new_placement: new,
        }
    }

    #[test]
    fn test_no_changes_returns_current_order() {
        let current = vec![level("b", 2), level("a", 1)];
        let past = reconstruct(current, &[]);

        assert_eq!(names(&past), vec!["a", "b"]);
    }

    #[test]
    fn test_undo_add() {
        let added = level("new", 2);
        let current = vec![level("a", 1), added.clone(), level("b", 3), level("c", 4)];
        let past = reconstruct(current, &[change(ChangeKind::Add, &added, None, Some(2))]);

        assert_eq!(names(&past), vec!["a", "b", "c"]);
        assert!(is_contiguous(&past));
    }

    #[test]
    fn test_undo_remove_restores_stub() {
        let gone = level("gone", 1);
        let current = vec![level("b", 1), level("c", 2)];
        let past = reconstruct(current, &[change(ChangeKind::Remove, &gone, Some(1), None)]);

        assert_eq!(names(&past), vec!["gone", "b", "c"]);
        assert!(past[0].reconstructed);
        assert_eq!(past[0].id, gone.id);
        assert!(past[0].creator.is_empty());
    }

    #[test]
    fn test_undo_moves_both_directions() {
        // a b c d e, then d moved 4 -> 2, then a moved 1 -> 5
        let a = level("a", 5);
        let d = level("d", 1);
        let current = vec![d.clone(), level("b", 2), level("c", 3), level("e", 4), a.clone()];
        let past = reconstruct(
            current,
            &[
                change(ChangeKind::Move, &a, Some(1), Some(5)),
                change(ChangeKind::Move, &d, Some(4), Some(2)),
            ],
        );

        assert_eq!(names(&past), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_scenario_insert_then_remove_replays_back() {
        // a b c; insert x at 2; remove a (at 1) -> x b c
        let a = level("a", 1);
        let x = level("x", 1);
        let current = vec![x.clone(), level("b", 2), level("c", 3)];
        let past = reconstruct(
            current,
            &[
                change(ChangeKind::Remove, &a, Some(1), None),
                change(ChangeKind::Add, &x, None, Some(2)),
            ],
        );

        assert_eq!(names(&past), vec!["a", "b", "c"]);
        assert!(is_contiguous(&past));
    }

    #[test]
    fn test_undo_insert_restores_level_pushed_off_the_end() {
        // a b c on a list capped at 3; insert x at 1 pushes c to #4 and drops it
        let x = level("x", 1);
        let c = level("c", 4);
        let current = vec![x.clone(), level("a", 2), level("b", 3)];
        let past = reconstruct(
            current,
            &[
                change(ChangeKind::Remove, &c, Some(4), None),
                change(ChangeKind::Add, &x, None, Some(1)),
            ],
        );

        assert_eq!(names(&past), vec!["a", "b", "c"]);
        assert!(past[2].reconstructed);
        assert!(is_contiguous(&past));
    }

    #[test]
    fn test_undo_several_drops_keeps_their_order() {
        // a b on a list capped at 2 that had c d pushed off together
        let c = level("c", 3);
        let d = level("d", 4);
        let current = vec![level("a", 1), level("b", 2)];
        let past = reconstruct(
            current,
            &[
                change(ChangeKind::Remove, &c, Some(3), None),
                change(ChangeKind::Remove, &d, Some(4), None),
            ],
        );

        assert_eq!(names(&past), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_unknown_level_still_yields_contiguous_list() {
        let stranger = level("stranger", 3);
        let current = vec![level("a", 1), level("b", 2)];
        let past = reconstruct(
            current,
            &[
                change(ChangeKind::Move, &stranger, Some(1), Some(3)),
                change(ChangeKind::Add, &stranger, None, Some(1)),
            ],
        );

        assert!(is_contiguous(&past));
        assert!(past.len() <= 2);
    }
}
