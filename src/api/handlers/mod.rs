pub mod agent;
pub mod automation;
pub mod system;

pub use agent::*;
pub use automation::*;
pub use system::*;
