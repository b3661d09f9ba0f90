//! Stack merging
//!
//! Partial stacks of the same item spread over several pool slots waste
//! space. Each pass plans at most one move per item: the smallest idle stack
//! tops up the largest one.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::allocator::Hold;
use crate::domain::{HoldId, Item, Location};
use crate::inventory::InventoryRecord;

/// A move the defragger wants queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub item_id: String,
    pub source: HoldId,
    pub destination: HoldId,
    pub count: u32,
}

/// Items with equal id and data stack together
fn stack_key(item: &Item) -> (String, Option<String>) {
    (
        item.item_id.clone(),
        item.data.as_ref().map(|data| data.to_string()),
    )
}

/// Plan merges over the pool.
///
/// Only unowned holds that no outstanding move names are considered, and only
/// with contents from the last scan of their inventory.
pub fn plan_merges(
    holds: &[Hold],
    records: &HashMap<Location, InventoryRecord>,
    busy: &HashSet<HoldId>,
    stack_size: u32,
) -> Vec<PlannedMove> {
    let mut groups: BTreeMap<(String, Option<String>), Vec<(&Hold, u32)>> = BTreeMap::new();

    for hold in holds {
        if !hold.is_free() || busy.contains(&hold.id) {
            continue;
        }
        let Some(item) = records
            .get(&hold.location)
            .and_then(|record| record.slots.get(hold.slot as usize))
            .and_then(Option::as_ref)
        else {
            continue;
        };
        if item.count == 0 || item.count >= stack_size {
            continue;
        }
        groups
            .entry(stack_key(item))
            .or_default()
            .push((hold, item.count));
    }

    groups
        .into_iter()
        .filter_map(|((item_id, _), mut stacks)| {
            if stacks.len() < 2 {
                return None;
            }
            // Stable: equal counts keep registration order
            stacks.sort_by_key(|(_, count)| *count);
            let (source, source_count) = stacks.first()?;
            let (destination, destination_count) = stacks.last()?;

            Some(PlannedMove {
                item_id,
                source: source.id,
                destination: destination.id,
                count: (*source_count).min(stack_size - destination_count),
            })
        })
        .collect()
}
