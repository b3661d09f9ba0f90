//! Last reported contents of every scanned inventory

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{AgentId, Item, Location};

/// One inventory as an agent last saw it
#[derive(Debug, Clone, Serialize)]
pub struct InventoryRecord {
    pub location: Location,
    /// `None` marks an empty slot
    pub slots: Vec<Option<Item>>,
    pub scanned_at: DateTime<Utc>,
    pub scanned_by: AgentId,
}

impl InventoryRecord {
    /// `(slot, occupied)` for every slot
    pub fn occupancy(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (idx as u32, slot.is_some()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InventoryStore {
    records: Arc<DashMap<Location, InventoryRecord>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace what is known about the inventory at `location`
    pub fn record(
        &self,
        location: Location,
        slots: Vec<Option<Item>>,
        scanned_by: AgentId,
        now: DateTime<Utc>,
    ) -> InventoryRecord {
        let record = InventoryRecord {
            location,
            slots,
            scanned_at: now,
            scanned_by,
        };
        self.records.insert(location, record.clone());
        record
    }

    pub fn get(&self, location: &Location) -> Option<InventoryRecord> {
        self.records.get(location).map(|r| r.value().clone())
    }

    /// Forget the inventory so the scanner treats it as never scanned
    pub fn invalidate(&self, location: &Location) -> bool {
        self.records.remove(location).is_some()
    }

    pub fn last_scanned(&self, location: &Location) -> Option<DateTime<Utc>> {
        self.records.get(location).map(|r| r.scanned_at)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimension, Vec3};

    #[test]
    fn test_rescan_overwrites() {
        let store = InventoryStore::new();
        let loc = Location::new(Dimension::Overworld, Vec3::new(0, 64, 0));
        let agent = AgentId::new();
        let t0 = Utc::now();

        let stone = Item {
            item_id: "minecraft:stone".into(),
            count: 64,
            data: None,
        };
        let first = store.record(loc, vec![Some(stone.clone()), None, None], agent, t0);
        assert_eq!(
            first.occupancy().collect::<Vec<_>>(),
            vec![(0, true), (1, false), (2, false)]
        );

        let later = t0 + chrono::Duration::seconds(5);
        store.record(loc, vec![Some(stone.clone()), Some(stone), None], agent, later);
        assert_eq!(store.last_scanned(&loc), Some(later));
        assert_eq!(store.get(&loc).unwrap().occupancy().filter(|(_, full)| *full).count(), 2);
        assert_eq!(store.len(), 1);

        assert!(store.invalidate(&loc));
        assert!(!store.invalidate(&loc));
        assert_eq!(store.last_scanned(&loc), None);
        assert!(store.is_empty());
    }
}
