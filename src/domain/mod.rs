pub mod ids;
pub mod world;

pub use ids::*;
pub use world::*;
