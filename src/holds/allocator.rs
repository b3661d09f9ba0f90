//! Hold allocator
//!
//! A hold is an exclusive claim on one storage slot. Holds are never removed
//! from the pool; they only toggle between free and owned. Ownership ends when
//! the linked operation completes, when the owner goes stale, or when the hold
//! outlives `holds.expiration_secs`.
//!
//! Only slots the last scan saw empty are handed out. Configured slots count
//! as empty until scanned.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::HoldsConfig;
use crate::domain::{AgentId, HoldId, Location, OperationId};
use crate::error::{OperatorError, Result};
use crate::registry::AgentRegistry;

/// An exclusive claim on one inventory slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hold {
    pub id: HoldId,
    pub location: Location,
    pub slot: u32,
    pub owner: Option<AgentId>,
    /// The last scan found items in this slot
    pub occupied: bool,
    /// Operation the hold was taken for; completing it releases the hold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
}

impl Hold {
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    /// Free and, as far as the operator knows, empty
    pub fn is_available(&self) -> bool {
        self.is_free() && !self.occupied
    }

    fn release(&mut self) {
        self.owner = None;
        self.operation = None;
        self.acquired_at = None;
    }
}

/// Result of asking for any free hold
#[derive(Debug, Clone)]
pub enum HoldOutcome {
    Acquired(Hold),
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HoldCounts {
    /// Unowned and empty
    pub free: usize,
    /// Unowned but holding items
    pub occupied: usize,
    pub owned: usize,
}

#[derive(Default)]
struct PoolState {
    /// Registration order; allocation scans front to back
    holds: Vec<Hold>,
    index: HashMap<HoldId, usize>,
    by_slot: HashMap<(Location, u32), HoldId>,
}

impl PoolState {
    /// Add a hold for the slot unless one exists. Returns whether it was new.
    fn register(&mut self, location: Location, slot: u32, occupied: bool) -> bool {
        if let Some(idx) = self
            .by_slot
            .get(&(location, slot))
            .and_then(|id| self.index.get(id))
        {
            self.holds[*idx].occupied = occupied;
            return false;
        }

        let hold = Hold {
            id: HoldId::new(),
            location,
            slot,
            owner: None,
            occupied,
            operation: None,
            acquired_at: None,
        };
        let id = hold.id;
        self.index.insert(id, self.holds.len());
        self.by_slot.insert((location, slot), id);
        self.holds.push(hold);
        true
    }

    fn release_where<F>(&mut self, mut predicate: F) -> Vec<HoldId>
    where
        F: FnMut(&Hold) -> bool,
    {
        let mut released = Vec::new();
        for hold in self.holds.iter_mut().filter(|h| !h.is_free()) {
            if predicate(hold) {
                hold.release();
                released.push(hold.id);
            }
        }
        released
    }
}

pub struct HoldAllocator {
    registry: Arc<AgentRegistry>,
    expiration: Duration,
    pool: RwLock<PoolState>,
}

impl HoldAllocator {
    /// Create an allocator seeded with the configured inventories
    pub fn new(registry: Arc<AgentRegistry>, config: &HoldsConfig) -> Self {
        let mut pool = PoolState::default();
        for entry in &config.pool {
            for slot in 0..entry.slots {
                pool.register(entry.location, slot, false);
            }
        }
        info!(
            "Hold pool seeded with {} holds across {} inventories",
            pool.holds.len(),
            config.pool.len()
        );

        Self {
            registry,
            expiration: crate::config::secs(config.expiration_secs),
            pool: RwLock::new(pool),
        }
    }

    /// Bring the pool in line with a scan of the inventory at `location`.
    ///
    /// Takes `(slot, occupied)` pairs. Unknown slots get a new hold and known
    /// ones have their occupancy updated. Returns how many holds were created.
    pub async fn sync_slots<I>(&self, location: Location, slots: I) -> usize
    where
        I: IntoIterator<Item = (u32, bool)>,
    {
        let mut pool = self.pool.write().await;
        let created = slots
            .into_iter()
            .filter(|(slot, occupied)| pool.register(location, *slot, *occupied))
            .count();
        if created > 0 {
            debug!("Registered {} new holds at {}", created, location);
        }
        created
    }

    /// Claim any free hold for `agent`, linking it to `operation` if given.
    ///
    /// Stale agents receive `Unavailable`; unknown agents are an error.
    pub async fn get_free_hold(
        &self,
        agent: AgentId,
        operation: Option<OperationId>,
    ) -> Result<HoldOutcome> {
        self.get_free_hold_at(agent, operation, Utc::now()).await
    }

    pub async fn get_free_hold_at(
        &self,
        agent: AgentId,
        operation: Option<OperationId>,
        now: DateTime<Utc>,
    ) -> Result<HoldOutcome> {
        if !self.registry.is_live_at(agent, now).await? {
            debug!("Stale agent {} asked for a hold", agent);
            return Ok(HoldOutcome::Unavailable);
        }

        let mut pool = self.pool.write().await;
        let Some(hold) = pool.holds.iter_mut().find(|h| h.is_available()) else {
            debug!("No free hold for agent {}", agent);
            return Ok(HoldOutcome::Unavailable);
        };

        hold.owner = Some(agent);
        hold.operation = operation;
        hold.acquired_at = Some(now);
        info!(
            "Hold {} ({} slot {}) acquired by agent {}",
            hold.id, hold.location, hold.slot, agent
        );

        Ok(HoldOutcome::Acquired(hold.clone()))
    }

    /// Read a hold. No ownership check.
    pub async fn get(&self, id: HoldId) -> Result<Hold> {
        let pool = self.pool.read().await;
        pool.index
            .get(&id)
            .and_then(|idx| pool.holds.get(*idx))
            .cloned()
            .ok_or(OperatorError::HoldNotFound(id))
    }

    /// Release every hold taken for `operation`
    pub async fn release_for_operation(&self, operation: OperationId) -> Vec<HoldId> {
        let released = self
            .pool
            .write()
            .await
            .release_where(|h| h.operation == Some(operation));
        if !released.is_empty() {
            debug!(
                "Released {} holds after operation {} completed",
                released.len(),
                operation
            );
        }
        released
    }

    /// Release every hold owned by `agent`
    pub async fn release_for_agent(&self, agent: AgentId) -> Vec<HoldId> {
        let released = self
            .pool
            .write()
            .await
            .release_where(|h| h.owner == Some(agent));
        if !released.is_empty() {
            warn!("Released {} holds of agent {}", released.len(), agent);
        }
        released
    }

    /// Release holds owned for longer than the expiration period
    pub async fn expire(&self, now: DateTime<Utc>) -> Vec<HoldId> {
        let expiration = self.expiration;
        let released = self.pool.write().await.release_where(|h| {
            h.acquired_at
                .is_some_and(|at| now.signed_duration_since(at) > expiration)
        });
        for id in &released {
            warn!("Hold {} expired", id);
        }
        released
    }

    /// Distinct inventory locations in the pool, in registration order
    pub async fn locations(&self) -> Vec<Location> {
        let pool = self.pool.read().await;
        let mut seen = std::collections::HashSet::new();
        pool.holds
            .iter()
            .filter(|h| seen.insert(h.location))
            .map(|h| h.location)
            .collect()
    }

    /// Copy of every hold, in registration order
    pub async fn snapshot(&self) -> Vec<Hold> {
        self.pool.read().await.holds.clone()
    }

    pub async fn counts(&self) -> HoldCounts {
        let pool = self.pool.read().await;
        let mut counts = HoldCounts::default();
        for hold in &pool.holds {
            if !hold.is_free() {
                counts.owned += 1;
            } else if hold.occupied {
                counts.occupied += 1;
            } else {
                counts.free += 1;
            }
        }
        counts
    }
}
