//! What an agent chases.

use nalgebra::Vector3;
use pursuit_env::{EntityId, TargetRoster};
use serde::{Deserialize, Serialize};

/// A chase target. Entities are resolved through the roster on every query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// A fixed point in space
    Point(Vector3<f64>),

    /// A body or tracked entity
    Entity(EntityId),
}

impl Target {
    /// The targeted entity, if the target is not a bare point.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Target::Point(_) => None,
            Target::Entity(id) => Some(*id),
        }
    }

    /// Current position of the target, if it can be located.
    pub fn resolve(&self, roster: &dyn TargetRoster) -> Option<Vector3<f64>> {
        match self {
            Target::Point(p) => Some(*p),
            Target::Entity(id) => roster.locate(*id),
        }
    }
}

impl From<Vector3<f64>> for Target {
    fn from(point: Vector3<f64>) -> Self {
        Target::Point(point)
    }
}

impl From<EntityId> for Target {
    fn from(entity: EntityId) -> Self {
        Target::Entity(entity)
    }
}
