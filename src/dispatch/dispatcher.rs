//! Operation dispatcher
//!
//! Hands pending operations to polling agents. All assignment transitions
//! happen under one lock, so concurrent pollers never share an operation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::operation::{Operation, OperationKind, OperationPriority, OperationState};
use super::queue::{PendingQueue, QueueStats};
use crate::config::OperationsConfig;
use crate::domain::{AgentId, HoldId, Location, OperationId};
use crate::error::{OperatorError, Result};
use crate::registry::AgentRegistry;

/// Result of a poll
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Available(Operation),
    Unavailable,
}

/// Dispatcher counters
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub pending: usize,
    pub assigned: usize,
    pub completed_total: u64,
    /// Operations held in memory, including recent completions
    pub tracked: usize,
    pub queue: QueueStats,
}

struct DispatchState {
    operations: HashMap<OperationId, Operation>,
    sequences: HashMap<OperationId, u64>,
    queue: PendingQueue,
    assignments: HashMap<AgentId, OperationId>,
    completed_count: u64,
    /// Completed operations still in `operations`, oldest first
    completed: VecDeque<OperationId>,
    completed_history: usize,
    /// Outstanding operation counts per scanned location and per moved hold
    scans: HashMap<Location, usize>,
    moves: HashMap<HoldId, usize>,
}

fn bump<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, usize>, key: K) {
    *counts.entry(key).or_insert(0) += 1;
}

fn drop_one<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, usize>, key: &K) {
    if let Some(n) = counts.get_mut(key) {
        *n -= 1;
        if *n == 0 {
            counts.remove(key);
        }
    }
}

impl DispatchState {
    fn track(&mut self, kind: &OperationKind) {
        match kind {
            OperationKind::ScanInventory { location } => bump(&mut self.scans, *location),
            OperationKind::MoveItems {
                source_hold,
                destination_hold,
                ..
            } => {
                bump(&mut self.moves, *source_hold);
                bump(&mut self.moves, *destination_hold);
            }
            OperationKind::Custom { .. } => {}
        }
    }

    fn untrack(&mut self, kind: &OperationKind) {
        match kind {
            OperationKind::ScanInventory { location } => drop_one(&mut self.scans, location),
            OperationKind::MoveItems {
                source_hold,
                destination_hold,
                ..
            } => {
                drop_one(&mut self.moves, source_hold);
                drop_one(&mut self.moves, destination_hold);
            }
            OperationKind::Custom { .. } => {}
        }
    }

    /// Remember a completed operation, forgetting the oldest beyond the limit
    fn retire(&mut self, operation_id: OperationId) {
        self.completed.push_back(operation_id);
        while self.completed.len() > self.completed_history {
            if let Some(old) = self.completed.pop_front() {
                self.operations.remove(&old);
            }
        }
    }
}

pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, config: &OperationsConfig) -> Self {
        Self {
            registry,
            state: Mutex::new(DispatchState {
                operations: HashMap::new(),
                sequences: HashMap::new(),
                queue: PendingQueue::new(config.max_pending, config.aging_interval_secs),
                assignments: HashMap::new(),
                completed_count: 0,
                completed: VecDeque::new(),
                completed_history: config.completed_history,
                scans: HashMap::new(),
                moves: HashMap::new(),
            }),
        }
    }

    /// Add a new pending operation
    pub async fn enqueue(&self, kind: OperationKind, priority: OperationPriority) -> Result<Operation> {
        self.enqueue_at(kind, priority, Utc::now()).await
    }

    pub async fn enqueue_at(
        &self,
        kind: OperationKind,
        priority: OperationPriority,
        now: DateTime<Utc>,
    ) -> Result<Operation> {
        let operation = Operation::new(kind, priority, now);
        let mut state = self.state.lock().await;

        let sequence = state
            .queue
            .enqueue(operation.id, priority, now)
            .map_err(|reason| {
                warn!("Rejected operation: {}", reason);
                OperatorError::QueueFull(state.queue.len())
            })?;

        state.sequences.insert(operation.id, sequence);
        state.track(&operation.kind);
        state.operations.insert(operation.id, operation.clone());
        debug!("Operation {} pending ({:?})", operation.id, priority);

        Ok(operation)
    }

    /// Hand the next pending operation to `agent`.
    ///
    /// An agent that already holds an assignment gets the same operation back.
    /// Stale agents get nothing until they heartbeat again.
    pub async fn poll(&self, agent: AgentId) -> Result<PollOutcome> {
        self.poll_at(agent, Utc::now()).await
    }

    pub async fn poll_at(&self, agent: AgentId, now: DateTime<Utc>) -> Result<PollOutcome> {
        if !self.registry.is_live_at(agent, now).await? {
            debug!("Stale agent {} polled, nothing assigned", agent);
            return Ok(PollOutcome::Unavailable);
        }

        let mut state = self.state.lock().await;

        if let Some(current) = state.assignments.get(&agent).copied() {
            if let Some(operation) = state.operations.get(&current) {
                return Ok(PollOutcome::Available(operation.clone()));
            }
        }

        let Some((_, operation_id)) = state.queue.dequeue(now) else {
            return Ok(PollOutcome::Unavailable);
        };

        let operation = state
            .operations
            .get_mut(&operation_id)
            .ok_or_else(|| OperatorError::Internal(format!("queued operation {operation_id} missing")))?;
        operation.state = OperationState::Assigned { agent };
        operation.assigned_at = Some(now);
        let assigned = operation.clone();

        state.assignments.insert(agent, operation_id);
        info!("Assigned operation {} to agent {}", operation_id, agent);

        Ok(PollOutcome::Available(assigned))
    }

    /// Mark an operation completed. Only its current assignee may do this.
    pub async fn complete(&self, agent: AgentId, operation_id: OperationId) -> Result<Operation> {
        self.complete_at(agent, operation_id, Utc::now()).await
    }

    pub async fn complete_at(
        &self,
        agent: AgentId,
        operation_id: OperationId,
        now: DateTime<Utc>,
    ) -> Result<Operation> {
        self.registry.require(agent).await?;

        let mut state = self.state.lock().await;
        let operation = state
            .operations
            .get_mut(&operation_id)
            .ok_or(OperatorError::UnknownOperation(operation_id))?;

        if operation.assignee() != Some(agent) {
            warn!(
                "Agent {} tried to complete operation {} in state {:?}",
                agent, operation_id, operation.state
            );
            return Err(OperatorError::NotOwner {
                operation: operation_id,
                agent,
            });
        }

        operation.state = OperationState::Completed { agent };
        operation.completed_at = Some(now);
        let completed = operation.clone();

        state.assignments.remove(&agent);
        state.sequences.remove(&operation_id);
        state.untrack(&completed.kind);
        state.retire(operation_id);
        state.completed_count += 1;
        info!("Agent {} completed operation {}", agent, operation_id);

        Ok(completed)
    }

    /// Take back the operation assigned to `agent` and return it to the queue
    /// at its original position.
    pub async fn reclaim_from(&self, agent: AgentId) -> Option<OperationId> {
        let mut state = self.state.lock().await;
        let operation_id = state.assignments.remove(&agent)?;
        let sequence = state.sequences.get(&operation_id).copied()?;

        let operation = state.operations.get_mut(&operation_id)?;
        operation.state = OperationState::Pending;
        operation.assigned_at = None;
        operation.reassignments += 1;
        let (priority, created_at) = (operation.priority, operation.created_at);

        state
            .queue
            .requeue(sequence, operation_id, priority, created_at);
        warn!(
            "Reclaimed operation {} from stale agent {}",
            operation_id, agent
        );

        Some(operation_id)
    }

    /// Operation currently assigned to `agent`
    pub async fn assignment_of(&self, agent: AgentId) -> Option<OperationId> {
        self.state.lock().await.assignments.get(&agent).copied()
    }

    pub async fn get(&self, operation_id: OperationId) -> Option<Operation> {
        self.state.lock().await.operations.get(&operation_id).cloned()
    }

    /// Locations with a scan operation that has not completed yet
    pub async fn outstanding_scan_locations(&self) -> HashSet<Location> {
        self.state.lock().await.scans.keys().copied().collect()
    }

    /// Holds named by a move operation that has not completed yet
    pub async fn busy_holds(&self) -> HashSet<HoldId> {
        self.state.lock().await.moves.keys().copied().collect()
    }

    pub async fn stats(&self) -> DispatchStats {
        let state = self.state.lock().await;
        DispatchStats {
            pending: state.queue.len(),
            assigned: state.assignments.len(),
            completed_total: state.completed_count,
            tracked: state.operations.len(),
            queue: state.queue.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn custom(n: i64) -> OperationKind {
        OperationKind::Custom {
            payload: serde_json::json!({ "n": n }),
        }
    }

    fn setup() -> (Arc<AgentRegistry>, Dispatcher) {
        let registry = Arc::new(AgentRegistry::new(30));
        let dispatcher = Dispatcher::new(registry.clone(), &OperationsConfig::default());
        (registry, dispatcher)
    }

    fn expect_available(outcome: PollOutcome) -> Operation {
        match outcome {
            PollOutcome::Available(op) => op,
            PollOutcome::Unavailable => panic!("expected an operation"),
        }
    }

    #[tokio::test]
    async fn test_poll_empty_is_unavailable() {
        let (registry, dispatcher) = setup();
        let agent = registry.register().await;
        assert!(matches!(
            dispatcher.poll(agent.id).await.unwrap(),
            PollOutcome::Unavailable
        ));
    }

    #[tokio::test]
    async fn test_poll_unknown_agent() {
        let (_, dispatcher) = setup();
        dispatcher.enqueue(custom(1), OperationPriority::Normal).await.unwrap();
        let err = dispatcher.poll(AgentId::new()).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnknownAgent(_)));
        assert_eq!(dispatcher.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn test_repoll_returns_same_operation() {
        let (registry, dispatcher) = setup();
        let agent = registry.register().await;
        dispatcher.enqueue(custom(1), OperationPriority::Normal).await.unwrap();
        dispatcher.enqueue(custom(2), OperationPriority::Normal).await.unwrap();

        let first = expect_available(dispatcher.poll(agent.id).await.unwrap());
        let again = expect_available(dispatcher.poll(agent.id).await.unwrap());
        assert_eq!(first.id, again.id);
        assert_eq!(dispatcher.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn test_complete_requires_owner() {
        let (registry, dispatcher) = setup();
        let a = registry.register().await;
        let b = registry.register().await;
        dispatcher.enqueue(custom(1), OperationPriority::Normal).await.unwrap();

        let op = expect_available(dispatcher.poll(a.id).await.unwrap());

        let err = dispatcher.complete(b.id, op.id).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotOwner { .. }));

        let done = dispatcher.complete(a.id, op.id).await.unwrap();
        assert_eq!(done.state, OperationState::Completed { agent: a.id });

        // Completed cannot be completed again
        let err = dispatcher.complete(a.id, op.id).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_complete_unknown_operation() {
        let (registry, dispatcher) = setup();
        let a = registry.register().await;
        let err = dispatcher.complete(a.id, OperationId::new()).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnknownOperation(_)));
    }

    #[tokio::test]
    async fn test_stale_agent_gets_nothing() {
        let (registry, dispatcher) = setup();
        let t0 = Utc::now();
        let agent = registry.register_at(t0).await;
        dispatcher.enqueue_at(custom(1), OperationPriority::Normal, t0).await.unwrap();

        let outcome = dispatcher
            .poll_at(agent.id, t0 + Duration::seconds(31))
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Unavailable));
        assert_eq!(dispatcher.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn test_reclaim_puts_operation_back_first() {
        let (registry, dispatcher) = setup();
        let a = registry.register().await;
        let b = registry.register().await;
        let first = dispatcher.enqueue(custom(1), OperationPriority::Normal).await.unwrap();
        dispatcher.enqueue(custom(2), OperationPriority::Normal).await.unwrap();

        expect_available(dispatcher.poll(a.id).await.unwrap());
        assert_eq!(dispatcher.reclaim_from(a.id).await, Some(first.id));
        assert_eq!(dispatcher.assignment_of(a.id).await, None);

        let taken = expect_available(dispatcher.poll(b.id).await.unwrap());
        assert_eq!(taken.id, first.id);
        assert_eq!(taken.reassignments, 1);

        // The original agent's late report is rejected
        let err = dispatcher.complete(a.id, first.id).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_completed_history_is_bounded() {
        let registry = Arc::new(AgentRegistry::new(30));
        let dispatcher = Dispatcher::new(
            registry.clone(),
            &OperationsConfig {
                completed_history: 2,
                ..OperationsConfig::default()
            },
        );
        let agent = registry.register().await;

        let mut done = Vec::new();
        for n in 0..5 {
            dispatcher.enqueue(custom(n), OperationPriority::Normal).await.unwrap();
            let op = expect_available(dispatcher.poll(agent.id).await.unwrap());
            dispatcher.complete(agent.id, op.id).await.unwrap();
            done.push(op.id);
        }

        let stats = dispatcher.stats().await;
        assert_eq!(stats.completed_total, 5);
        assert_eq!(stats.tracked, 2);
        assert!(dispatcher.get(done[0]).await.is_none());
        assert!(dispatcher.get(done[4]).await.is_some());

        // Recent completions still answer NotOwner, forgotten ones are unknown
        let err = dispatcher.complete(agent.id, done[4]).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotOwner { .. }));
        let err = dispatcher.complete(agent.id, done[0]).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnknownOperation(_)));
    }

    #[tokio::test]
    async fn test_outstanding_scans_and_moves_follow_completion() {
        let (registry, dispatcher) = setup();
        let agent = registry.register().await;
        let chest = Location::new(
            crate::domain::Dimension::Overworld,
            crate::domain::Vec3::new(1, 64, 1),
        );
        let (from, to) = (HoldId::new(), HoldId::new());

        dispatcher
            .enqueue(OperationKind::ScanInventory { location: chest }, OperationPriority::Normal)
            .await
            .unwrap();
        dispatcher
            .enqueue(
                OperationKind::MoveItems {
                    source_hold: from,
                    destination_hold: to,
                    count: 3,
                },
                OperationPriority::Normal,
            )
            .await
            .unwrap();
        assert!(dispatcher.outstanding_scan_locations().await.contains(&chest));
        assert_eq!(dispatcher.busy_holds().await, HashSet::from([from, to]));

        let scan = expect_available(dispatcher.poll(agent.id).await.unwrap());
        dispatcher.complete(agent.id, scan.id).await.unwrap();
        assert!(dispatcher.outstanding_scan_locations().await.is_empty());
        assert_eq!(dispatcher.busy_holds().await.len(), 2);

        let mv = expect_available(dispatcher.poll(agent.id).await.unwrap());
        dispatcher.complete(agent.id, mv.id).await.unwrap();
        assert!(dispatcher.busy_holds().await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_full_surfaces_error() {
        let registry = Arc::new(AgentRegistry::new(30));
        let dispatcher = Dispatcher::new(
            registry,
            &OperationsConfig {
                max_pending: 1,
                ..OperationsConfig::default()
            },
        );
        dispatcher.enqueue(custom(1), OperationPriority::Normal).await.unwrap();
        let err = dispatcher
            .enqueue(custom(2), OperationPriority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::QueueFull(1)));
    }
}
