use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AgentId, HoldId, Location, OperationId};

/// Work an agent performs. The operator only routes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationKind {
    /// Open the inventory at `location` and report it via `inventory_scanned`
    ScanInventory { location: Location },
    /// Move `count` items between two held slots
    MoveItems {
        source_hold: HoldId,
        destination_hold: HoldId,
        count: u32,
    },
    /// Planner-defined work
    Custom { payload: serde_json::Value },
}

/// Planner-assigned urgency. Lower rank is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum OperationPriority {
    Urgent = 0,
    #[default]
    Normal = 1,
    Background = 2,
}

impl OperationPriority {
    pub fn rank(&self) -> u64 {
        *self as u64
    }
}

/// Lifecycle of an operation: Pending -> Assigned -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum OperationState {
    Pending,
    Assigned { agent: AgentId },
    Completed { agent: AgentId },
}

/// A unit of work tracked by the dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub priority: OperationPriority,
    pub state: OperationState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Times this operation was taken back from a stale agent
    pub reassignments: u32,
}

impl Operation {
    pub fn new(kind: OperationKind, priority: OperationPriority, now: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            priority,
            state: OperationState::Pending,
            created_at: now,
            assigned_at: None,
            completed_at: None,
            reassignments: 0,
        }
    }

    /// Agent currently assigned, if any
    pub fn assignee(&self) -> Option<AgentId> {
        match self.state {
            OperationState::Assigned { agent } => Some(agent),
            _ => None,
        }
    }
}
