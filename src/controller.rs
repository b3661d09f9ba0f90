//! Controller
//!
//! Ties the registry, dispatcher, hold allocator, sign store and pathfinder
//! together. Request handlers and background services go through this type
//! only.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dispatch::{DispatchStats, Dispatcher, Operation, OperationKind, OperationPriority, PollOutcome};
use crate::domain::{AgentId, HoldId, Item, Location, OperationId, Vec3};
use crate::error::{OperatorError, Result};
use crate::holds::{plan_merges, Hold, HoldAllocator, HoldCounts, HoldOutcome};
use crate::inventory::{InventoryRecord, InventoryStore};
use crate::pathfinding::{Pathfinder, PathfindingError};
use crate::registry::{Agent, AgentAlert, AgentCounts, AgentRegistry};
use crate::signs::{CompileReport, CompiledSignConfig, ScanRegion, SignConfigStore};

/// What one round of background maintenance did
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub stale_agents: Vec<AgentId>,
    pub reclaimed_operations: Vec<OperationId>,
    pub released_holds: usize,
    pub expired_holds: usize,
    pub scans_enqueued: usize,
    pub merges_enqueued: usize,
}

impl TickSummary {
    pub fn is_idle(&self) -> bool {
        self.stale_agents.is_empty()
            && self.reclaimed_operations.is_empty()
            && self.released_holds == 0
            && self.expired_holds == 0
            && self.scans_enqueued == 0
            && self.merges_enqueued == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub complexes: usize,
    pub regions: usize,
}

/// Snapshot served by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub agents: AgentCounts,
    pub operations: DispatchStats,
    pub holds: HoldCounts,
    pub graph: GraphCounts,
    pub inventories: usize,
    pub alerts: usize,
}

/// Result of reporting an inventory's contents
#[derive(Debug, Clone, Serialize)]
pub struct InventoryScanOutcome {
    /// Storage complex the inventory belongs to, if any
    pub complex: Option<String>,
    pub holds_registered: usize,
}

pub struct Controller {
    registry: Arc<AgentRegistry>,
    dispatcher: Dispatcher,
    holds: HoldAllocator,
    signs: SignConfigStore,
    pathfinder: Pathfinder,
    inventory: InventoryStore,
    rescan_interval: Duration,
    /// Stack size used for merging, `None` when merging is off
    merge_stack_size: Option<u32>,
    started_at: DateTime<Utc>,
}

impl Controller {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_sign_store(config, SignConfigStore::default())
    }

    /// Build with a custom sign store, e.g. one using a different grammar
    pub fn with_sign_store(config: &AppConfig, signs: SignConfigStore) -> Self {
        let registry = Arc::new(AgentRegistry::new(config.agents.heartbeat_timeout_secs));
        Self {
            dispatcher: Dispatcher::new(registry.clone(), &config.operations),
            holds: HoldAllocator::new(registry.clone(), &config.holds),
            registry,
            signs,
            pathfinder: Pathfinder::new(&config.pathfinding),
            inventory: InventoryStore::new(),
            rescan_interval: crate::config::secs(config.services.rescan_interval_secs),
            merge_stack_size: config
                .services
                .defrag_enabled
                .then_some(config.services.stack_size),
            started_at: Utc::now(),
        }
    }

    // ==================== Agents ====================

    /// Fail with `UnknownAgent` unless `agent` is registered
    pub async fn require_agent(&self, agent: AgentId) -> Result<Agent> {
        self.registry.require(agent).await
    }

    pub async fn register(&self) -> Agent {
        self.registry.register().await
    }

    pub async fn heartbeat(&self, agent: AgentId) -> Result<Agent> {
        self.registry.heartbeat(agent).await
    }

    pub async fn alert(&self, agent: AgentId, description: &str) -> Result<AgentAlert> {
        self.registry.alert(agent, description).await
    }

    /// Newest alerts first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<AgentAlert> {
        self.registry.recent_alerts(limit).await
    }

    // ==================== Operations ====================

    pub async fn poll_operation(&self, agent: AgentId) -> Result<PollOutcome> {
        self.dispatcher.poll(agent).await
    }

    /// Complete an operation and release every hold taken for it. Inventories
    /// touched by a move are forgotten so they get scanned again.
    pub async fn operation_complete(&self, agent: AgentId, operation: OperationId) -> Result<Operation> {
        let completed = self.dispatcher.complete(agent, operation).await?;
        self.holds.release_for_operation(operation).await;

        if let OperationKind::MoveItems {
            source_hold,
            destination_hold,
            ..
        } = &completed.kind
        {
            for hold in [source_hold, destination_hold] {
                if let Ok(hold) = self.holds.get(*hold).await {
                    if self.inventory.invalidate(&hold.location) {
                        debug!("Inventory at {} needs a rescan after a move", hold.location);
                    }
                }
            }
        }
        Ok(completed)
    }

    /// Look up an operation. Old completions are eventually forgotten.
    pub async fn operation(&self, operation: OperationId) -> Result<Operation> {
        self.dispatcher
            .get(operation)
            .await
            .ok_or(OperatorError::UnknownOperation(operation))
    }

    /// Queue new work from the planner
    pub async fn enqueue_operation(
        &self,
        kind: OperationKind,
        priority: OperationPriority,
    ) -> Result<Operation> {
        if let OperationKind::MoveItems {
            source_hold,
            destination_hold,
            count,
        } = &kind
        {
            if *count == 0 {
                return Err(OperatorError::Validation("count must be positive".into()));
            }
            if source_hold == destination_hold {
                return Err(OperatorError::Validation(
                    "source and destination hold must differ".into(),
                ));
            }
            self.holds.get(*source_hold).await?;
            self.holds.get(*destination_hold).await?;
        }

        self.dispatcher.enqueue(kind, priority).await
    }

    // ==================== Holds ====================

    /// Claim any free hold, tied to the agent's current operation if it has one
    pub async fn get_free_hold(&self, agent: AgentId) -> Result<HoldOutcome> {
        let operation = self.dispatcher.assignment_of(agent).await;
        self.holds.get_free_hold(agent, operation).await
    }

    pub async fn get_hold(&self, agent: AgentId, hold: HoldId) -> Result<Hold> {
        self.registry.require(agent).await?;
        self.holds.get(hold).await
    }

    // ==================== Inventories ====================

    /// Record an inventory's contents. Slots of inventories inside a storage
    /// complex join the hold pool; only empty ones can be handed out.
    pub async fn inventory_scanned(
        &self,
        agent: AgentId,
        location: Location,
        slots: Vec<Option<Item>>,
    ) -> Result<InventoryScanOutcome> {
        self.registry.require(agent).await?;
        let record = self.inventory.record(location, slots, agent, Utc::now());

        let graph = self.signs.current().await;
        let Some(complex) = graph.complex_at(&location) else {
            debug!("Inventory at {} is outside every storage complex", location);
            return Ok(InventoryScanOutcome {
                complex: None,
                holds_registered: 0,
            });
        };

        let holds_registered = self
            .holds
            .sync_slots(location, record.occupancy())
            .await;
        if holds_registered > 0 {
            info!(
                "Inventory at {} ({}) added {} holds",
                location, complex.name, holds_registered
            );
        }

        Ok(InventoryScanOutcome {
            complex: Some(complex.name.clone()),
            holds_registered,
        })
    }

    // ==================== Signs and paths ====================

    pub async fn submit_sign_scan(
        &self,
        agent: AgentId,
        regions: Vec<ScanRegion>,
    ) -> Result<Arc<CompileReport>> {
        self.registry.require(agent).await?;
        Ok(self.signs.submit_regions(regions).await)
    }

    pub async fn sign_config(&self) -> Arc<CompiledSignConfig> {
        self.signs.current().await
    }

    /// Report of the most recent sign compile
    pub async fn sign_report(&self) -> Arc<CompileReport> {
        self.signs.last_report().await
    }

    pub async fn find_path(
        &self,
        start: Location,
        end: Location,
    ) -> std::result::Result<Vec<Vec3>, PathfindingError> {
        let graph = self.signs.current().await;
        self.pathfinder.find_path(&graph, start, end)
    }

    // ==================== Maintenance ====================

    /// One round of background maintenance: stale agents lose their work and
    /// holds, overdue holds are released, pool inventories due for a scan get
    /// one queued, and partial stacks get merge moves queued.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary {
            stale_agents: self.registry.expire_stale(now).await,
            ..TickSummary::default()
        };

        // Every stale agent, not only the ones that just went stale: an agent
        // can poll or take a hold between its expiry and this sweep.
        for agent in self.registry.stale_agents().await {
            if let Some(operation) = self.dispatcher.reclaim_from(agent).await {
                summary.reclaimed_operations.push(operation);
            }
            summary.released_holds += self.holds.release_for_agent(agent).await.len();
        }

        summary.expired_holds = self.holds.expire(now).await.len();
        summary.scans_enqueued = self.enqueue_due_scans(now).await;
        if let Some(stack_size) = self.merge_stack_size {
            summary.merges_enqueued = self.enqueue_merges(stack_size, now).await;
        }

        if !summary.is_idle() {
            info!(
                "Maintenance: {} stale agents, {} operations reclaimed, {} holds released, {} expired, {} scans queued, {} merges queued",
                summary.stale_agents.len(),
                summary.reclaimed_operations.len(),
                summary.released_holds,
                summary.expired_holds,
                summary.scans_enqueued,
                summary.merges_enqueued
            );
        }
        summary
    }

    async fn enqueue_due_scans(&self, now: DateTime<Utc>) -> usize {
        let outstanding = self.dispatcher.outstanding_scan_locations().await;
        let mut enqueued = 0;

        for location in self.holds.locations().await {
            if outstanding.contains(&location) {
                continue;
            }
            let due = self
                .inventory
                .last_scanned(&location)
                .map_or(true, |at| now.signed_duration_since(at) > self.rescan_interval);
            if !due {
                continue;
            }

            match self
                .dispatcher
                .enqueue_at(
                    OperationKind::ScanInventory { location },
                    OperationPriority::Background,
                    now,
                )
                .await
            {
                Ok(_) => enqueued += 1,
                Err(e) => {
                    warn!("Could not queue scan of {}: {}", location, e);
                    break;
                }
            }
        }
        enqueued
    }

    async fn enqueue_merges(&self, stack_size: u32, now: DateTime<Utc>) -> usize {
        let holds = self.holds.snapshot().await;
        let records: HashMap<Location, InventoryRecord> = self
            .holds
            .locations()
            .await
            .into_iter()
            .filter_map(|location| self.inventory.get(&location).map(|r| (location, r)))
            .collect();
        let busy = self.dispatcher.busy_holds().await;

        let mut enqueued = 0;
        for planned in plan_merges(&holds, &records, &busy, stack_size) {
            let kind = OperationKind::MoveItems {
                source_hold: planned.source,
                destination_hold: planned.destination,
                count: planned.count,
            };
            match self
                .dispatcher
                .enqueue_at(kind, OperationPriority::Background, now)
                .await
            {
                Ok(op) => {
                    debug!(
                        "Queued merge {} of {} x{} ({} -> {})",
                        op.id, planned.item_id, planned.count, planned.source, planned.destination
                    );
                    enqueued += 1;
                }
                Err(e) => {
                    warn!("Could not queue merge of {}: {}", planned.item_id, e);
                    break;
                }
            }
        }
        enqueued
    }

    pub async fn health(&self) -> HealthSummary {
        let graph = self.signs.current().await;
        HealthSummary {
            status: "ok",
            uptime_secs: Utc::now().signed_duration_since(self.started_at).num_seconds(),
            agents: self.registry.counts().await,
            operations: self.dispatcher.stats().await,
            holds: self.holds.counts().await,
            graph: GraphCounts {
                nodes: graph.nodes.len(),
                complexes: graph.complexes.len(),
                regions: self.signs.region_count().await,
            },
            inventories: self.inventory.len(),
            alerts: self.registry.alert_count().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoldPoolEntry;
    use crate::domain::{Dimension, Vec2};
    use crate::signs::Sign;

    fn chest() -> Location {
        Location::new(Dimension::Overworld, Vec3::new(4, 64, 4))
    }

    fn config_with_pool(slots: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.holds.pool.push(HoldPoolEntry {
            location: chest(),
            slots,
        });
        config
    }

    fn storage_region() -> ScanRegion {
        ScanRegion {
            signs: vec![Sign {
                lines: vec!["[storage]".into(), "main".into()],
                location: Location::new(Dimension::Overworld, Vec3::new(0, 64, 0)),
            }],
            bounds: (Vec2::new(0, 0), Vec2::new(15, 15)),
            dimension: Dimension::Overworld,
        }
    }

    #[tokio::test]
    async fn test_completion_releases_linked_holds() {
        let controller = Controller::new(&config_with_pool(2));
        let agent = controller.register().await;
        controller
            .enqueue_operation(
                OperationKind::Custom {
                    payload: serde_json::json!({}),
                },
                OperationPriority::Normal,
            )
            .await
            .unwrap();

        let PollOutcome::Available(op) = controller.poll_operation(agent.id).await.unwrap() else {
            panic!("expected an operation");
        };
        let HoldOutcome::Acquired(hold) = controller.get_free_hold(agent.id).await.unwrap() else {
            panic!("expected a hold");
        };
        assert_eq!(hold.operation, Some(op.id));

        controller.operation_complete(agent.id, op.id).await.unwrap();
        assert!(controller.get_hold(agent.id, hold.id).await.unwrap().is_free());
    }

    #[tokio::test]
    async fn test_tick_reclaims_from_stale_agent() {
        let controller = Controller::new(&config_with_pool(1));
        let agent = controller.register().await;
        controller
            .enqueue_operation(
                OperationKind::Custom {
                    payload: serde_json::json!({ "job": 1 }),
                },
                OperationPriority::Urgent,
            )
            .await
            .unwrap();
        let PollOutcome::Available(op) = controller.poll_operation(agent.id).await.unwrap() else {
            panic!("expected an operation");
        };
        controller.get_free_hold(agent.id).await.unwrap();

        let summary = controller.tick(Utc::now() + Duration::seconds(31)).await;
        assert_eq!(summary.stale_agents, vec![agent.id]);
        assert_eq!(summary.reclaimed_operations, vec![op.id]);
        assert_eq!(summary.released_holds, 1);

        let err = controller.operation_complete(agent.id, op.id).await.unwrap_err();
        assert!(matches!(err, OperatorError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_tick_sweeps_agents_flagged_stale_earlier() {
        let controller = Controller::new(&config_with_pool(1));
        let agent = controller.register().await;
        controller
            .enqueue_operation(
                OperationKind::Custom {
                    payload: serde_json::json!({ "job": 2 }),
                },
                OperationPriority::Normal,
            )
            .await
            .unwrap();
        let PollOutcome::Available(op) = controller.poll_operation(agent.id).await.unwrap() else {
            panic!("expected an operation");
        };
        controller.get_free_hold(agent.id).await.unwrap();

        // Flagged by a pass that ran before the assignment and hold landed
        let later = Utc::now() + Duration::seconds(31);
        assert_eq!(controller.registry.expire_stale(later).await, vec![agent.id]);

        let summary = controller.tick(later).await;
        assert!(summary.stale_agents.is_empty());
        assert_eq!(summary.reclaimed_operations, vec![op.id]);
        assert_eq!(summary.released_holds, 1);
        assert_eq!(controller.health().await.operations.pending, 1);

        let summary = controller.tick(later).await;
        assert!(summary.reclaimed_operations.is_empty());
        assert_eq!(summary.released_holds, 0);
    }

    #[tokio::test]
    async fn test_scanner_queues_each_pool_inventory_once() {
        let controller = Controller::new(&config_with_pool(3));
        let now = Utc::now();

        assert_eq!(controller.tick(now).await.scans_enqueued, 1);
        // Outstanding scan is not duplicated
        assert_eq!(controller.tick(now).await.scans_enqueued, 0);

        let agent = controller.register().await;
        let PollOutcome::Available(op) = controller.poll_operation(agent.id).await.unwrap() else {
            panic!("expected a scan");
        };
        assert!(matches!(op.kind, OperationKind::ScanInventory { .. }));
        controller
            .inventory_scanned(agent.id, chest(), vec![None, None, None])
            .await
            .unwrap();
        controller.operation_complete(agent.id, op.id).await.unwrap();

        // Freshly scanned
        assert_eq!(controller.tick(Utc::now()).await.scans_enqueued, 0);
        let later = Utc::now() + Duration::seconds(601);
        assert_eq!(controller.tick(later).await.scans_enqueued, 1);
    }

    #[tokio::test]
    async fn test_inventory_in_complex_adds_holds() {
        let controller = Controller::new(&AppConfig::default());
        let agent = controller.register().await;
        controller
            .submit_sign_scan(agent.id, vec![storage_region()])
            .await
            .unwrap();

        let outcome = controller
            .inventory_scanned(agent.id, chest(), vec![None, None, None])
            .await
            .unwrap();
        assert_eq!(outcome.complex.as_deref(), Some("main"));
        assert_eq!(outcome.holds_registered, 3);

        // Same report again is idempotent
        let again = controller
            .inventory_scanned(agent.id, chest(), vec![None, None, None])
            .await
            .unwrap();
        assert_eq!(again.holds_registered, 0);

        let outside = Location::new(Dimension::Overworld, Vec3::new(40, 64, 40));
        let outcome = controller
            .inventory_scanned(agent.id, outside, vec![None])
            .await
            .unwrap();
        assert!(outcome.complex.is_none());
        assert_eq!(controller.health().await.holds.free, 3);
    }

    fn stack(id: &str, count: u32) -> Option<Item> {
        Some(Item {
            item_id: id.into(),
            count,
            data: None,
        })
    }

    #[tokio::test]
    async fn test_partial_stacks_get_one_merge_until_rescanned() {
        let controller = Controller::new(&AppConfig::default());
        let agent = controller.register().await;
        controller
            .submit_sign_scan(agent.id, vec![storage_region()])
            .await
            .unwrap();
        controller
            .inventory_scanned(
                agent.id,
                chest(),
                vec![stack("minecraft:stone", 40), None, stack("minecraft:stone", 10)],
            )
            .await
            .unwrap();

        let now = Utc::now();
        let summary = controller.tick(now).await;
        assert_eq!(summary.merges_enqueued, 1);
        assert_eq!(summary.scans_enqueued, 0);
        // The outstanding move keeps both holds out of planning
        assert_eq!(controller.tick(now).await.merges_enqueued, 0);

        let PollOutcome::Available(op) = controller.poll_operation(agent.id).await.unwrap() else {
            panic!("expected the merge");
        };
        let OperationKind::MoveItems {
            source_hold,
            destination_hold,
            count,
        } = op.kind
        else {
            panic!("expected a move");
        };
        assert_eq!(op.priority, OperationPriority::Background);
        assert_eq!(count, 10);
        assert_eq!(controller.get_hold(agent.id, source_hold).await.unwrap().slot, 2);
        assert_eq!(controller.get_hold(agent.id, destination_hold).await.unwrap().slot, 0);

        controller.operation_complete(agent.id, op.id).await.unwrap();
        assert_eq!(controller.health().await.inventories, 0);

        // Contents are unknown until the chest is scanned again
        let summary = controller.tick(now).await;
        assert_eq!(summary.merges_enqueued, 0);
        assert_eq!(summary.scans_enqueued, 1);
    }

    #[tokio::test]
    async fn test_merging_can_be_switched_off() {
        let mut config = AppConfig::default();
        config.services.defrag_enabled = false;
        let controller = Controller::new(&config);
        let agent = controller.register().await;
        controller
            .submit_sign_scan(agent.id, vec![storage_region()])
            .await
            .unwrap();
        controller
            .inventory_scanned(
                agent.id,
                chest(),
                vec![stack("minecraft:sand", 3), stack("minecraft:sand", 3)],
            )
            .await
            .unwrap();

        assert_eq!(controller.tick(Utc::now()).await.merges_enqueued, 0);
    }

    #[tokio::test]
    async fn test_alerts_are_readable() {
        let controller = Controller::new(&AppConfig::default());
        let agent = controller.register().await;
        controller.alert(agent.id, "stuck in water").await.unwrap();
        controller.alert(agent.id, "out of food").await.unwrap();

        let recent = controller.recent_alerts(1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].description, "out of food");
        assert_eq!(controller.health().await.alerts, 2);
    }

    #[tokio::test]
    async fn test_move_items_validation() {
        let controller = Controller::new(&config_with_pool(1));
        let hold = HoldId::new();
        let err = controller
            .enqueue_operation(
                OperationKind::MoveItems {
                    source_hold: hold,
                    destination_hold: hold,
                    count: 1,
                },
                OperationPriority::Normal,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));

        let err = controller
            .enqueue_operation(
                OperationKind::MoveItems {
                    source_hold: hold,
                    destination_hold: HoldId::new(),
                    count: 4,
                },
                OperationPriority::Normal,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::HoldNotFound(_)));
    }
}
