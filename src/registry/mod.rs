//! Agent Registry
//!
//! Identity, heartbeat liveness and fault reports for every agent in the fleet.

pub mod agents;
pub mod alerts;

pub use agents::{Agent, AgentCounts, AgentRegistry, AgentStatus};
pub use alerts::{AgentAlert, AlertLog, AlertLogConfig};
