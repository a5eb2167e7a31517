//! Geometry oracle abstraction (raycasts against the host world).

use crate::types::EntityId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result of a raycast that struck something.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// World-space impact point
    pub position: Vector3<f64>,

    /// Entity that was hit, when the host can attribute it
    pub entity: Option<EntityId>,
}

/// Set of entities a raycast must pass through.
///
/// The chase controller keeps one per agent, rebuilt whenever the target
/// changes (the agent itself plus the target's body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaycastFilter {
    excluded: HashSet<EntityId>,
}

impl RaycastFilter {
    /// Creates a filter excluding the given entities.
    pub fn excluding<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = EntityId>,
    {
        Self {
            excluded: entities.into_iter().collect(),
        }
    }

    /// Returns true if hits on `entity` must be ignored.
    pub fn excludes(&self, entity: EntityId) -> bool {
        self.excluded.contains(&entity)
    }

    /// Returns true if a hit should be reported.
    pub fn accepts(&self, hit: &RayHit) -> bool {
        hit.entity.map_or(true, |e| !self.excludes(e))
    }

    /// Number of excluded entities.
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    /// Returns true if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

/// Raycast oracle over the host's collision geometry.
///
/// `direction` is not normalized: its length is the ray length.
pub trait GeometryOracle: Send + Sync + 'static {
    /// Casts a ray and returns the nearest accepted hit, if any.
    fn raycast(
        &self,
        origin: Vector3<f64>,
        direction: Vector3<f64>,
        filter: &RaycastFilter,
    ) -> Option<RayHit>;
}
