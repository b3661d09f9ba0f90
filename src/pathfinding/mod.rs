pub mod search;

pub use search::{Pathfinder, PathfindingError};
