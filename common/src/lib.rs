mod constants;
mod lists;

pub mod history;
pub mod placement;
pub mod scoring;

pub use constants::*;
pub use lists::*;
pub use placement::{Placed, Shift};
