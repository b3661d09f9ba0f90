//! Sign compiler
//!
//! Turns scanned sign regions into a route graph and a storage layout. The
//! batch is never rejected: anything that cannot be used is skipped and listed
//! in the [`CompileReport`]. Declarations are put in a canonical order before
//! they are applied, so the output depends only on the set of signs and not on
//! the order they were scanned in.

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::parser::{SignDeclaration, SignParseError, SignParser};
use super::types::{CompiledSignConfig, PathfindingNode, RegionKey, ScanRegion, StorageComplex};
use crate::domain::{Dimension, Location, Vec3};

/// A tagged sign that could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSign {
    pub location: Location,
    pub reason: String,
}

/// A declaration that lost to an earlier one with the same name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateDeclaration {
    pub kind: &'static str,
    pub name: String,
    pub location: Location,
}

/// A reference to a node that does not exist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DanglingReference {
    /// Node or point kind holding the reference
    pub from: String,
    pub to: String,
}

/// Everything the compiler skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileReport {
    pub signs_seen: usize,
    /// Signs without a declaration tag
    pub ignored: usize,
    pub rejected: Vec<RejectedSign>,
    pub duplicates: Vec<DuplicateDeclaration>,
    pub dangling_connections: Vec<DanglingReference>,
    pub self_connections: Vec<String>,
    /// Pickup and dropoff signs naming a node that does not exist
    pub orphan_points: Vec<DanglingReference>,
}

impl CompileReport {
    /// True when every tagged sign was used as declared
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
            && self.duplicates.is_empty()
            && self.dangling_connections.is_empty()
            && self.self_connections.is_empty()
            && self.orphan_points.is_empty()
    }
}

fn canonical(location: &Location) -> (Dimension, Vec3) {
    (location.dim, location.vec3)
}

#[derive(Clone, Copy)]
enum PointKind {
    Pickup,
    Dropoff,
}

impl PointKind {
    fn as_str(&self) -> &'static str {
        match self {
            PointKind::Pickup => "pickup",
            PointKind::Dropoff => "dropoff",
        }
    }
}

/// Compile `regions` into a fresh config
pub fn compile<'a, I>(regions: I, parser: &dyn SignParser) -> (CompiledSignConfig, CompileReport)
where
    I: IntoIterator<Item = &'a ScanRegion>,
{
    let mut report = CompileReport::default();
    let mut declarations: Vec<(Location, RegionKey, SignDeclaration)> = Vec::new();

    for region in regions {
        let key = RegionKey::from(region);
        for sign in &region.signs {
            report.signs_seen += 1;
            match parser.parse(&sign.lines) {
                Ok(declaration) => declarations.push((sign.location, key, declaration)),
                Err(SignParseError::NotADeclaration) => report.ignored += 1,
                Err(e) => {
                    debug!("Skipping sign at {}: {}", sign.location, e);
                    report.rejected.push(RejectedSign {
                        location: sign.location,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    declarations.sort_by(|a, b| {
        (canonical(&a.0), &a.1, &a.2).cmp(&(canonical(&b.0), &b.1, &b.2))
    });
    report
        .rejected
        .sort_by(|a, b| (canonical(&a.location), &a.reason).cmp(&(canonical(&b.location), &b.reason)));

    let mut nodes: BTreeMap<String, PathfindingNode> = BTreeMap::new();
    let mut complexes: BTreeMap<String, StorageComplex> = BTreeMap::new();
    let mut points: Vec<(PointKind, String, Location)> = Vec::new();

    for (location, region, declaration) in declarations {
        match declaration {
            SignDeclaration::Node { name, connections } => match nodes.entry(name) {
                Entry::Vacant(slot) => {
                    let name = slot.key().clone();
                    slot.insert(PathfindingNode {
                        location,
                        name,
                        connections,
                        pickup: None,
                        dropoff: None,
                    });
                }
                Entry::Occupied(existing) => report.duplicates.push(DuplicateDeclaration {
                    kind: "node",
                    name: existing.key().clone(),
                    location,
                }),
            },
            SignDeclaration::Pickup { node } => points.push((PointKind::Pickup, node, location)),
            SignDeclaration::Dropoff { node } => points.push((PointKind::Dropoff, node, location)),
            SignDeclaration::Storage { name, y_level } => match complexes.entry(name) {
                Entry::Vacant(slot) => {
                    let name = slot.key().clone();
                    slot.insert(StorageComplex {
                        dimension: region.dimension,
                        y_level: y_level.unwrap_or(location.vec3.y),
                        bounds: region.bounds(),
                        name,
                    });
                }
                Entry::Occupied(existing) => report.duplicates.push(DuplicateDeclaration {
                    kind: "storage",
                    name: existing.key().clone(),
                    location,
                }),
            },
        }
    }

    let names: BTreeSet<String> = nodes.keys().cloned().collect();
    for node in nodes.values_mut() {
        let mut kept = BTreeSet::new();
        for target in std::mem::take(&mut node.connections) {
            if target == node.name {
                report.self_connections.push(node.name.clone());
            } else if names.contains(&target) {
                kept.insert(target);
            } else {
                report.dangling_connections.push(DanglingReference {
                    from: node.name.clone(),
                    to: target,
                });
            }
        }
        node.connections = kept.into_iter().collect();
    }
    report.self_connections.dedup();

    for (kind, node_name, location) in points {
        let Some(node) = nodes.get_mut(&node_name) else {
            report.orphan_points.push(DanglingReference {
                from: kind.as_str().to_string(),
                to: node_name,
            });
            continue;
        };

        let point = match kind {
            PointKind::Pickup => &mut node.pickup,
            PointKind::Dropoff => &mut node.dropoff,
        };
        if point.is_none() {
            *point = Some(location.vec3);
        } else {
            report.duplicates.push(DuplicateDeclaration {
                kind: kind.as_str(),
                name: node_name,
                location,
            });
        }
    }

    info!(
        "Compiled {} signs into {} nodes and {} complexes ({} ignored, {} rejected, {} dangling)",
        report.signs_seen,
        nodes.len(),
        complexes.len(),
        report.ignored,
        report.rejected.len(),
        report.dangling_connections.len()
    );

    (CompiledSignConfig { nodes, complexes }, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Vec2;
    use crate::signs::parser::DefaultSignParser;
    use crate::signs::types::Sign;

    fn sign(x: i32, z: i32, lines: &[&str]) -> Sign {
        Sign {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            location: Location::new(Dimension::Overworld, Vec3::new(x, 64, z)),
        }
    }

    fn region(signs: Vec<Sign>) -> ScanRegion {
        ScanRegion {
            signs,
            bounds: (Vec2::new(-100, -100), Vec2::new(100, 100)),
            dimension: Dimension::Overworld,
        }
    }

    fn run(regions: &[ScanRegion]) -> (CompiledSignConfig, CompileReport) {
        compile(regions, &DefaultSignParser)
    }

    #[test]
    fn test_ghost_edge_dropped_node_kept() {
        let (config, report) = run(&[region(vec![
            sign(0, 0, &["[node]", "a", "b, ghost"]),
            sign(10, 0, &["[node]", "b", "a"]),
        ])]);

        assert_eq!(config.nodes["a"].connections, vec!["b".to_string()]);
        assert_eq!(
            report.dangling_connections,
            vec![DanglingReference {
                from: "a".into(),
                to: "ghost".into()
            }]
        );
        assert!(!config.nodes.contains_key("ghost"));
    }

    fn mixed_signs() -> Vec<Sign> {
        vec![
            sign(0, 0, &["[node]", "a", "b"]),
            sign(10, 0, &["[node]", "b", "c, a"]),
            sign(20, 0, &["[node]", "c"]),
            sign(1, 0, &["[pickup]", "a"]),
            sign(5, 5, &["[storage]", "main"]),
        ]
    }

    #[test]
    fn test_order_independent() {
        let mut reversed = mixed_signs();
        reversed.reverse();

        let (forward, forward_report) = run(&[region(mixed_signs())]);
        let (backward, backward_report) = run(&[region(reversed)]);
        assert_eq!(forward, backward);
        assert_eq!(forward_report, backward_report);

        // Same input twice gives the same config
        assert_eq!(forward, run(&[region(mixed_signs())]).0);
    }

    #[test]
    fn test_duplicate_name_keeps_smallest_location() {
        let (config, report) = run(&[region(vec![
            sign(50, 0, &["[node]", "hub"]),
            sign(-5, 0, &["[node]", "hub"]),
        ])]);

        assert_eq!(config.nodes["hub"].location.vec3.x, -5);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].location.vec3.x, 50);
    }

    #[test]
    fn test_self_connection_and_duplicates_removed() {
        let (config, report) = run(&[region(vec![
            sign(0, 0, &["[node]", "a", "a, b, b"]),
            sign(1, 0, &["[node]", "b"]),
        ])]);
        assert_eq!(config.nodes["a"].connections, vec!["b".to_string()]);
        assert_eq!(report.self_connections, vec!["a".to_string()]);
    }

    #[test]
    fn test_points_attach_to_nodes() {
        let (config, report) = run(&[region(vec![
            sign(0, 0, &["[node]", "dock"]),
            sign(2, 1, &["[pickup]", "dock"]),
            sign(3, 1, &["[dropoff]", "dock"]),
            sign(4, 1, &["[dropoff]", "nowhere"]),
        ])]);

        let dock = &config.nodes["dock"];
        assert_eq!(dock.pickup, Some(Vec3::new(2, 64, 1)));
        assert_eq!(dock.dropoff, Some(Vec3::new(3, 64, 1)));
        assert_eq!(report.orphan_points.len(), 1);
        assert_eq!(report.orphan_points[0].to, "nowhere");
    }

    #[test]
    fn test_storage_takes_region_bounds() {
        let (config, _) = run(&[region(vec![
            sign(0, 0, &["[storage]", "main", "70"]),
            sign(3, 3, &["[storage]", "annex"]),
        ])]);

        let main = &config.complexes["main"];
        assert_eq!(main.y_level, 70);
        assert_eq!(main.bounds, (Vec2::new(-100, -100), Vec2::new(100, 100)));
        assert_eq!(config.complexes["annex"].y_level, 64);
    }

    #[test]
    fn test_bad_signs_never_abort() {
        let (config, report) = run(&[region(vec![
            sign(0, 0, &["Welcome"]),
            sign(1, 0, &["[node]"]),
            sign(2, 0, &["[teleport]", "x"]),
            sign(3, 0, &["[node]", "ok"]),
        ])]);

        assert_eq!(config.nodes.len(), 1);
        assert_eq!(report.signs_seen, 4);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(!report.is_clean());
    }
}
