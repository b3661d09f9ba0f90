//! Shortest routes over the compiled sign graph
//!
//! A route is a free-space leg to the node nearest the start, the cheapest
//! chain of connected nodes, and a free-space leg from the node nearest the
//! end. Connections are traversed in both directions.

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::config::PathfindingConfig;
use crate::domain::{Dimension, Location, Vec3};
use crate::signs::{CompiledSignConfig, PathfindingNode};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathfindingError {
    #[error("no pathfinding node in {0}")]
    NoNodeInDimension(Dimension),

    #[error("{location} is {distance:.1} blocks from the nearest node ({limit:.1} allowed)")]
    OutOfReach {
        location: Location,
        distance: f64,
        limit: f64,
    },

    #[error("no route from node {from} to node {to}")]
    NoRoute { from: String, to: String },
}

type Cost = OrderedFloat<f64>;

#[derive(Debug, Clone)]
pub struct Pathfinder {
    portal_cost: f64,
    max_free_space_distance: f64,
}

impl Pathfinder {
    pub fn new(config: &PathfindingConfig) -> Self {
        Self {
            portal_cost: config.portal_cost,
            max_free_space_distance: config.max_free_space_distance,
        }
    }

    /// Waypoints from `start` to `end`, both ends included
    pub fn find_path(
        &self,
        graph: &CompiledSignConfig,
        start: Location,
        end: Location,
    ) -> Result<Vec<Vec3>, PathfindingError> {
        let entry = self.nearest_node(graph, &start)?;
        let exit = self.nearest_node(graph, &end)?;
        let route = self.shortest_route(graph, entry, exit)?;

        let mut path = Vec::with_capacity(route.len() + 2);
        path.push(start.vec3);
        path.extend(route.iter().map(|node| node.location.vec3));
        path.push(end.vec3);
        path.dedup();

        debug!(
            "Path {} -> {} via {} nodes ({} waypoints)",
            start,
            end,
            route.len(),
            path.len()
        );
        Ok(path)
    }

    /// Closest node in the same dimension; equal distances go to the smaller name
    fn nearest_node<'g>(
        &self,
        graph: &'g CompiledSignConfig,
        location: &Location,
    ) -> Result<&'g PathfindingNode, PathfindingError> {
        let (distance, node) = graph
            .nodes
            .values()
            .filter(|node| node.location.dim == location.dim)
            .map(|node| (OrderedFloat(node.location.vec3.distance(&location.vec3)), node))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)))
            .ok_or(PathfindingError::NoNodeInDimension(location.dim))?;

        if distance.0 > self.max_free_space_distance {
            return Err(PathfindingError::OutOfReach {
                location: *location,
                distance: distance.0,
                limit: self.max_free_space_distance,
            });
        }
        Ok(node)
    }

    fn edge_cost(&self, a: &PathfindingNode, b: &PathfindingNode) -> f64 {
        if a.location.dim == b.location.dim {
            a.location.vec3.distance(&b.location.vec3)
        } else {
            self.portal_cost
        }
    }

    fn shortest_route<'g>(
        &self,
        graph: &'g CompiledSignConfig,
        from: &'g PathfindingNode,
        to: &'g PathfindingNode,
    ) -> Result<Vec<&'g PathfindingNode>, PathfindingError> {
        let adjacency = undirected_adjacency(graph);

        let mut dist: HashMap<&str, Cost> = HashMap::new();
        let mut prev: HashMap<&str, &str> = HashMap::new();
        let mut settled: HashSet<&str> = HashSet::new();
        let mut heap = BinaryHeap::new();

        dist.insert(from.name.as_str(), OrderedFloat(0.0));
        heap.push(Reverse((OrderedFloat(0.0), from.name.as_str())));

        while let Some(Reverse((cost, name))) = heap.pop() {
            if !settled.insert(name) {
                continue;
            }
            if name == to.name {
                break;
            }

            let Some(node) = graph.nodes.get(name) else {
                continue;
            };
            for &next in adjacency.get(name).into_iter().flatten() {
                if settled.contains(next) {
                    continue;
                }
                let Some(next_node) = graph.nodes.get(next) else {
                    continue;
                };

                let candidate = cost + OrderedFloat(self.edge_cost(node, next_node));
                match dist.get(next) {
                    Some(known) if candidate > *known => {}
                    Some(known) if candidate == *known => {
                        if prev.get(next).is_some_and(|p| name < *p) {
                            prev.insert(next, name);
                        }
                    }
                    _ => {
                        dist.insert(next, candidate);
                        prev.insert(next, name);
                        heap.push(Reverse((candidate, next)));
                    }
                }
            }
        }

        if !settled.contains(to.name.as_str()) {
            return Err(PathfindingError::NoRoute {
                from: from.name.clone(),
                to: to.name.clone(),
            });
        }

        let mut route = vec![to];
        let mut cursor = to.name.as_str();
        while let Some(p) = prev.get(cursor) {
            if let Some(node) = graph.nodes.get(*p) {
                route.push(node);
            }
            cursor = *p;
        }
        route.reverse();
        Ok(route)
    }
}

fn undirected_adjacency(graph: &CompiledSignConfig) -> HashMap<&str, BTreeSet<&str>> {
    let mut adjacency: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for node in graph.nodes.values() {
        for other in &node.connections {
            if !graph.nodes.contains_key(other) {
                continue;
            }
            adjacency
                .entry(node.name.as_str())
                .or_default()
                .insert(other.as_str());
            adjacency
                .entry(other.as_str())
                .or_default()
                .insert(node.name.as_str());
        }
    }
    adjacency
}
