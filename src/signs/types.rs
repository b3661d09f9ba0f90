use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Bounds, Dimension, Location, Vec2, Vec3};

/// A scanned sign: its text lines and where it stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sign {
    pub lines: Vec<String>,
    pub location: Location,
}

/// Every sign an agent found inside one area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub signs: Vec<Sign>,
    pub bounds: Bounds,
    pub dimension: Dimension,
}

/// Identity of a scanned area, independent of corner order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    pub dimension: Dimension,
    pub min: Vec2,
    pub max: Vec2,
}

impl RegionKey {
    pub fn new(dimension: Dimension, bounds: Bounds) -> Self {
        let (a, b) = bounds;
        Self {
            dimension,
            min: Vec2::new(a.x.min(b.x), a.z.min(b.z)),
            max: Vec2::new(a.x.max(b.x), a.z.max(b.z)),
        }
    }

    pub fn bounds(&self) -> Bounds {
        (self.min, self.max)
    }
}

impl From<&ScanRegion> for RegionKey {
    fn from(region: &ScanRegion) -> Self {
        Self::new(region.dimension, region.bounds)
    }
}

/// A named waypoint in the route graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathfindingNode {
    pub location: Location,
    pub name: String,
    /// Names of adjacent nodes. Every entry resolves to a node in the same
    /// compiled config.
    pub connections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Vec3>,
}

/// A named storage area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageComplex {
    pub dimension: Dimension,
    pub y_level: i32,
    pub bounds: Bounds,
    pub name: String,
}

impl StorageComplex {
    /// Whether an inventory at `location` belongs to this complex
    pub fn contains(&self, location: &Location) -> bool {
        location.dim == self.dimension
            && location.vec3.y == self.y_level
            && crate::domain::bounds_contain(&self.bounds, location.vec3.xz())
    }
}

/// Queryable snapshot of the route graph and storage layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledSignConfig {
    pub nodes: BTreeMap<String, PathfindingNode>,
    pub complexes: BTreeMap<String, StorageComplex>,
}

impl CompiledSignConfig {
    /// First complex, by name, containing `location`
    pub fn complex_at(&self, location: &Location) -> Option<&StorageComplex> {
        self.complexes.values().find(|c| c.contains(location))
    }
}
