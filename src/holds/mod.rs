//! Exclusive claims on storage slots, and merging of partial stacks

pub mod allocator;
pub mod defrag;

pub use allocator::{Hold, HoldAllocator, HoldCounts, HoldOutcome};
pub use defrag::{plan_merges, PlannedMove};
