//! Placement arithmetic shared by the reordering engine, personal lists and
//! history replay.
//!
//! Every reorder is expressed as at most one [`Shift`]: a contiguous range of
//! placements that all move by the same delta. The server applies a shift as a
//! single `UPDATE`; the in-memory helpers below apply it to a `Vec` so the same
//! plan can be replayed (history) or checked (tests) without a database.

/// Anything that occupies a 1-based placement in an ordered list.
pub trait Placed {
    fn placement(&self) -> i32;
    fn set_placement(&mut self, placement: i32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    /// First placement affected (inclusive)
    pub from: i32,
    /// Last placement affected (inclusive), `None` for the rest of the list
    pub to: Option<i32>,
    pub delta: i32,
}

impl Shift {
    pub fn contains(&self, placement: i32) -> bool {
        placement >= self.from && self.to.map_or(true, |to| placement <= to)
    }

    pub fn shifted(&self, placement: i32) -> i32 {
        if self.contains(placement) {
            placement + self.delta
        } else {
            placement
        }
    }

    /// Upper bound usable as a SQL parameter.
    pub fn upper_bound(&self) -> i32 {
        self.to.unwrap_or(i32::MAX)
    }

    pub fn apply<T: Placed>(&self, items: &mut [T]) {
        for item in items.iter_mut() {
            let placement = item.placement();
            if self.contains(placement) {
                item.set_placement(placement + self.delta);
            }
        }
    }
}

/// Opens a gap at `target` by pushing it and everything below it down one.
pub fn insert_shift(target: i32) -> Shift {
    Shift {
        from: target,
        to: None,
        delta: 1,
    }
}

/// Closes the gap left at `removed`.
pub fn remove_shift(removed: i32) -> Shift {
    Shift {
        from: removed + 1,
        to: None,
        delta: -1,
    }
}

/// Shift applied to the other entries when one moves from `old` to `new`.
/// Returns `None` when the move is a no-op.
pub fn move_shift(old: i32, new: i32) -> Option<Shift> {
    if new < old {
        Some(Shift {
            from: new,
            to: Some(old - 1),
            delta: 1,
        })
    } else if new > old {
        Some(Shift {
            from: old + 1,
            to: Some(new),
            delta: -1,
        })
    } else {
        None
    }
}

/// Insert targets past the end are pulled back to `len + 1` so no gap opens.
pub fn clamp_insert(target: i32, len: i32) -> i32 {
    target.clamp(1, len.max(0) + 1)
}

/// Move targets past the end are pulled back to `len`.
pub fn clamp_move(target: i32, len: i32) -> i32 {
    target.clamp(1, len.max(1))
}

/// Places `item` at its own placement, pushing the occupants down.
pub fn insert<T: Placed>(items: &mut Vec<T>, item: T) {
    insert_shift(item.placement()).apply(items);
    items.push(item);
}

/// Moves the first entry matching `pred` to `new`. Returns the old placement.
pub fn move_to<T: Placed>(items: &mut [T], pred: impl Fn(&T) -> bool, new: i32) -> Option<i32> {
    let index = items.iter().position(|item| pred(item))?;
    let old = items[index].placement();
    if let Some(shift) = move_shift(old, new) {
        shift.apply(items);
        items[index].set_placement(new);
    }
    Some(old)
}

/// Removes the first entry matching `pred` and closes its gap.
pub fn remove<T: Placed>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> Option<T> {
    let index = items.iter().position(|item| pred(item))?;
    let removed = items.remove(index);
    remove_shift(removed.placement()).apply(items);
    Some(removed)
}

/// Drops every entry placed past `max_len`, returning what was dropped.
pub fn truncate<T: Placed>(items: &mut Vec<T>, max_len: i32) -> Vec<T> {
    let (kept, dropped): (Vec<T>, Vec<T>) = items
        .drain(..)
        .partition(|item| item.placement() <= max_len);
    *items = kept;
    dropped
}

/// Sorts by placement and rewrites placements to `1..=N`.
/// Entries with a non-positive placement are discarded.
pub fn renumber<T: Placed>(items: &mut Vec<T>) {
    items.retain(|item| item.placement() > 0);
    items.sort_by_key(|item| item.placement());
    for (index, item) in items.iter_mut().enumerate() {
        item.set_placement(index as i32 + 1);
    }
}

pub fn is_contiguous<T: Placed>(items: &[T]) -> bool {
    let mut placements: Vec<i32> = items.iter().map(Placed::placement).collect();
    placements.sort_unstable();
    placements
        .iter()
        .enumerate()
        .all(|(index, placement)| *placement == index as i32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        name: &'static str,
        placement: i32,
    }

    impl Placed for Entry {
        fn placement(&self) -> i32 {
            self.placement
        }

        fn set_placement(&mut self, placement: i32) {
            self.placement = placement;
        }
    }

    fn entry(name: &'static str, placement: i32) -> Entry {
        Entry { name, placement }
    }

    fn list(names: &[&'static str]) -> Vec<Entry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| entry(name, i as i32 + 1))
            .collect()
    }

    fn order(items: &[Entry]) -> Vec<&'static str> {
        let mut sorted = items.to_vec();
        sorted.sort_by_key(|e| e.placement);
        sorted.into_iter().map(|e| e.name).collect()
    }

    fn placement_of(items: &[Entry], name: &str) -> i32 {
        items.iter().find(|e| e.name == name).unwrap().placement
    }

    #[test]
    fn test_move_shift_ranges() {
        assert_eq!(
            move_shift(5, 2),
            Some(Shift { from: 2, to: Some(4), delta: 1 })
        );
        assert_eq!(
            move_shift(2, 5),
            Some(Shift { from: 3, to: Some(5), delta: -1 })
        );
        assert_eq!(move_shift(3, 3), None);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_insert(10, 3), 4);
        assert_eq!(clamp_insert(0, 3), 1);
        assert_eq!(clamp_insert(5, 0), 1);
        assert_eq!(clamp_move(10, 3), 3);
        assert_eq!(clamp_move(-2, 3), 1);
    }

    #[test]
    fn test_insert_pushes_occupants_down() {
        let mut items = list(&["a", "b", "c"]);
        insert(&mut items, entry("new", 2));

        assert_eq!(order(&items), vec!["a", "new", "b", "c"]);
        assert_eq!(placement_of(&items, "b"), 3);
        assert_eq!(placement_of(&items, "c"), 4);
        assert!(is_contiguous(&items));
    }

    #[test]
    fn test_insert_then_remove_top() {
        let mut items = list(&["a", "b", "c"]);
        insert(&mut items, entry("new", 2));
        let removed = remove(&mut items, |e| e.placement == 1).unwrap();

        assert_eq!(removed, entry("a", 1));
        assert_eq!(order(&items), vec!["new", "b", "c"]);
        assert!(is_contiguous(&items));
    }

    #[test]
    fn test_move_up_and_down() {
        let mut items = list(&["a", "b", "c", "d", "e"]);

        assert_eq!(move_to(&mut items, |e| e.name == "d", 2), Some(4));
        assert_eq!(order(&items), vec!["a", "d", "b", "c", "e"]);

        assert_eq!(move_to(&mut items, |e| e.name == "a", 5), Some(1));
        assert_eq!(order(&items), vec!["d", "b", "c", "e", "a"]);
        assert!(is_contiguous(&items));
    }

    #[test]
    fn test_move_to_same_placement_changes_nothing() {
        let mut items = list(&["a", "b", "c"]);
        let before = items.clone();

        assert_eq!(move_to(&mut items, |e| e.name == "b", 2), Some(2));
        assert_eq!(items, before);
    }

    #[test]
    fn test_remove_then_reinsert_restores_order() {
        let mut items = list(&["a", "b", "c", "d"]);
        let removed = remove(&mut items, |e| e.name == "b").unwrap();
        insert(&mut items, entry("b2", removed.placement));

        assert_eq!(order(&items), vec!["a", "b2", "c", "d"]);
    }

    #[test]
    fn test_truncate_drops_overflow() {
        let mut items = list(&["a", "b", "c"]);
        insert(&mut items, entry("new", 1));
        let dropped = truncate(&mut items, 3);

        assert_eq!(dropped, vec![entry("c", 4)]);
        assert_eq!(order(&items), vec!["new", "a", "b"]);
    }

    #[test]
    fn test_renumber_closes_gaps_and_drops_non_positive() {
        let mut items = vec![entry("a", 7), entry("b", 0), entry("c", 3), entry("d", -1)];
        renumber(&mut items);

        assert_eq!(items, vec![entry("c", 1), entry("a", 2)]);
    }

    #[test]
    fn test_random_operations_keep_placements_contiguous() {
        const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let max_len = 6;
        let mut rng = StdRng::seed_from_u64(0x9e37_79b9);
        let mut items: Vec<Entry> = Vec::new();

        for step in 0..500 {
            let len = items.len() as i32;
            match rng.gen_range(0..3) {
                0 => {
                    let target = clamp_insert(rng.gen_range(1..=len + 3), len);
                    let name = NAMES[step % NAMES.len()];
                    insert(&mut items, entry(name, target));
                    truncate(&mut items, max_len);
                }
                1 if len > 0 => {
                    let pick = rng.gen_range(1..=len);
                    let target = clamp_move(rng.gen_range(1..=len + 2), len);
                    move_to(&mut items, |e| e.placement == pick, target);
                    truncate(&mut items, max_len);
                }
                2 if len > 0 => {
                    let pick = rng.gen_range(1..=len);
                    remove(&mut items, |e| e.placement == pick);
                }
                _ => {}
            }

            assert!(is_contiguous(&items), "gap or duplicate after step {}", step);
            assert!(items.len() as i32 <= max_len);
        }
    }
}
