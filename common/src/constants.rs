/// Maximum number of levels kept on the main list
pub const MAIN_LIST_MAX_LEN: i32 = 150;

/// Maximum number of levels kept on every other list
pub const SECONDARY_LIST_MAX_LEN: i32 = 75;

/// Points awarded for the level at placement 1
pub const TOP_PLACEMENT_POINTS: f64 = 500.0;

/// Per-placement decay applied to the top placement's points
pub const POINTS_DECAY: f64 = 0.9801;

/// Placements past this one award no points
pub const MAX_SCORED_PLACEMENT: i32 = 150;
