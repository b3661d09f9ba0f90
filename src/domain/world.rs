use serde::{Deserialize, Serialize};

/// Horizontal block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub z: i32,
}

impl Vec2 {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Block coordinate in a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3 {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Straight-line distance between two block coordinates
    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        let dz = f64::from(self.z) - f64::from(other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn xz(&self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }
}

/// World partition. Coordinates in different dimensions are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Overworld,
    TheNether,
    TheEnd,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::TheNether => "the_nether",
            Dimension::TheEnd => "the_end",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A position in a specific dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub vec3: Vec3,
    pub dim: Dimension,
}

impl Location {
    pub fn new(dim: Dimension, vec3: Vec3) -> Self {
        Self { vec3, dim }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@({}, {}, {})",
            self.dim, self.vec3.x, self.vec3.y, self.vec3.z
        )
    }
}

/// Inclusive horizontal bounds, stored as two corners in any order
pub type Bounds = (Vec2, Vec2);

/// Whether `point` lies inside `bounds` (inclusive, corner order irrelevant)
pub fn bounds_contain(bounds: &Bounds, point: Vec2) -> bool {
    let (a, b) = bounds;
    let (min_x, max_x) = (a.x.min(b.x), a.x.max(b.x));
    let (min_z, max_z) = (a.z.min(b.z), a.z.max(b.z));
    (min_x..=max_x).contains(&point.x) && (min_z..=max_z).contains(&point.z)
}

/// One stack in an inventory slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub count: u32,
    /// Extra item data (enchantments, custom names, ...). Opaque to the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
