//! Operation Dispatcher
//!
//! - Pending queue: FIFO within a priority class, aged so nothing starves
//! - Dispatcher: atomic poll/assign, owner-checked completion, stale reclaim

pub mod dispatcher;
pub mod operation;
pub mod queue;

pub use dispatcher::{DispatchStats, Dispatcher, PollOutcome};
pub use operation::{Operation, OperationKind, OperationPriority, OperationState};
pub use queue::{PendingQueue, QueueStats};
