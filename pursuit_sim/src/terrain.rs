//! Box terrain implementing the geometry oracle.
//!
//! The world is a set of axis-aligned boxes. Ground boxes carry agents;
//! wall boxes only obstruct rays. Agents stand with their root
//! [`ROOT_HEIGHT`] above the ground surface.

use nalgebra::Vector3;
use pursuit_env::{EntityId, GeometryOracle, RayHit, RaycastFilter};
use serde::{Deserialize, Serialize};

/// Height of an agent's root above the surface it stands on.
pub const ROOT_HEIGHT: f64 = 1.0;

/// What a terrain box is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxKind {
    /// Walkable ground
    Ground,

    /// Obstruction
    Wall,
}

/// An axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainBox {
    /// Host entity of the box (ray hits report it)
    pub entity: EntityId,

    /// Minimum corner
    pub min: Vector3<f64>,

    /// Maximum corner
    pub max: Vector3<f64>,

    /// Ground or wall
    pub kind: BoxKind,
}

impl TerrainBox {
    /// Entry parameter of the segment `origin + t * direction`, `t ∈ [0, 1]`.
    ///
    /// Slab method; a segment starting inside the box enters at `t = 0`.
    pub fn intersect(&self, origin: &Vector3<f64>, direction: &Vector3<f64>) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = 1.0_f64;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() < f64::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// True if the XZ footprint contains the point.
    pub fn covers(&self, point: &Vector3<f64>) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.z >= self.min.z && point.z <= self.max.z
    }
}

/// A static world of boxes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerrainWorld {
    boxes: Vec<TerrainBox>,
    next_id: u64,
}

impl TerrainWorld {
    /// Creates an empty world (every ray misses, every probe is a drop).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a box and returns its entity.
    pub fn add(&mut self, min: Vector3<f64>, max: Vector3<f64>, kind: BoxKind) -> EntityId {
        let entity = EntityId::from_seed(0x7e44_0000 + self.next_id);
        self.next_id += 1;
        self.boxes.push(TerrainBox { entity, min, max, kind });
        entity
    }

    /// Adds a one-unit-thick ground slab whose top is at `top`.
    pub fn add_ground(&mut self, x: (f64, f64), z: (f64, f64), top: f64) -> EntityId {
        self.add(
            Vector3::new(x.0, top - 1.0, z.0),
            Vector3::new(x.1, top, z.1),
            BoxKind::Ground,
        )
    }

    /// Adds a wall standing on `base`.
    pub fn add_wall(&mut self, x: (f64, f64), z: (f64, f64), base: f64, height: f64) -> EntityId {
        self.add(
            Vector3::new(x.0, base, z.0),
            Vector3::new(x.1, base + height, z.1),
            BoxKind::Wall,
        )
    }

    /// A flat plain with its surface at y = 0.
    pub fn plain(half_extent: f64) -> Self {
        let mut world = Self::new();
        world.add_ground((-half_extent, half_extent), (-half_extent, half_extent), 0.0);
        world
    }

    /// A plain with a wall across the z axis at `z`, spanning `half_width` in x.
    pub fn walled(half_extent: f64, z: f64, half_width: f64) -> Self {
        let mut world = Self::plain(half_extent);
        world.add_wall((-half_width, half_width), (z - 0.5, z + 0.5), 0.0, 6.0);
        world
    }

    /// Two plateaus at y = 0 separated by a chasm between `edge` and `far_edge` in z.
    pub fn chasm(half_extent: f64, edge: f64, far_edge: f64) -> Self {
        let mut world = Self::new();
        world.add_ground((-half_extent, half_extent), (-half_extent, edge), 0.0);
        world.add_ground((-half_extent, half_extent), (far_edge, half_extent), 0.0);
        world
    }

    /// All boxes.
    pub fn boxes(&self) -> &[TerrainBox] {
        &self.boxes
    }

    /// Height of the highest ground surface at or below `point`.
    pub fn surface_below(&self, point: &Vector3<f64>) -> Option<f64> {
        self.boxes
            .iter()
            .filter(|b| b.kind == BoxKind::Ground && b.covers(point) && b.max.y <= point.y + f64::EPSILON)
            .map(|b| b.max.y)
            .max_by(f64::total_cmp)
    }
}

impl GeometryOracle for TerrainWorld {
    fn raycast(
        &self,
        origin: Vector3<f64>,
        direction: Vector3<f64>,
        filter: &RaycastFilter,
    ) -> Option<RayHit> {
        self.boxes
            .iter()
            .filter(|b| !filter.excludes(b.entity))
            .filter_map(|b| b.intersect(&origin, &direction).map(|t| (t, b.entity)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, entity)| RayHit {
                position: origin + direction * t,
                entity: Some(entity),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn down(depth: f64) -> Vector3<f64> {
        Vector3::new(0.0, -depth, 0.0)
    }

    #[test]
    fn test_plain_ground_probe() {
        let world = TerrainWorld::plain(50.0);
        let hit = world
            .raycast(Vector3::new(3.0, ROOT_HEIGHT, 4.0), down(5.0), &RaycastFilter::default())
            .expect("ground below");
        assert_relative_eq!(hit.position.y, 0.0);

        let short = world.raycast(Vector3::new(3.0, 10.0, 4.0), down(5.0), &RaycastFilter::default());
        assert!(short.is_none(), "probe ends above the ground");
    }

    #[test]
    fn test_wall_blocks_sight() {
        let world = TerrainWorld::walled(50.0, 10.0, 20.0);
        let from = Vector3::new(0.0, ROOT_HEIGHT, 0.0);
        let to = Vector3::new(0.0, ROOT_HEIGHT, 20.0);

        let hit = world.raycast(from, to - from, &RaycastFilter::default()).expect("wall");
        assert_relative_eq!(hit.position.z, 9.5);

        let around = Vector3::new(30.0, ROOT_HEIGHT, 20.0);
        let side = Vector3::new(30.0, ROOT_HEIGHT, 0.0);
        assert!(world.raycast(side, around - side, &RaycastFilter::default()).is_none());
    }

    #[test]
    fn test_filter_passes_through_excluded_box() {
        let mut world = TerrainWorld::new();
        let wall = world.add_wall((-1.0, 1.0), (4.0, 5.0), 0.0, 3.0);
        let from = Vector3::new(0.0, 1.0, 0.0);
        let ray = Vector3::new(0.0, 0.0, 10.0);

        assert!(world.raycast(from, ray, &RaycastFilter::default()).is_some());
        assert!(world.raycast(from, ray, &RaycastFilter::excluding([wall])).is_none());
    }

    #[test]
    fn test_chasm_has_no_ground() {
        let world = TerrainWorld::chasm(50.0, 5.0, 15.0);
        let filter = RaycastFilter::default();

        assert!(world.raycast(Vector3::new(0.0, 1.0, 2.0), down(5.0), &filter).is_some());
        assert!(world.raycast(Vector3::new(0.0, 1.0, 8.0), down(5.0), &filter).is_none());
        assert!(world.raycast(Vector3::new(0.0, 1.0, 16.0), down(5.0), &filter).is_some());
        assert_eq!(world.surface_below(&Vector3::new(0.0, 1.0, 10.0)), None);
        assert_eq!(world.surface_below(&Vector3::new(0.0, 1.0, 20.0)), Some(0.0));
    }
}
