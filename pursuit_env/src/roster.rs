//! Target roster abstraction: who can be chased, and where they are.

use crate::types::EntityId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A potential chase target reported by the roster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Host entity
    pub entity: EntityId,

    /// Current position
    pub position: Vector3<f64>,

    /// Explicitly excluded from automatic target selection
    pub non_targetable: bool,
}

/// Read-only view of the entities agents may chase.
///
/// Shared by every agent; implementations must tolerate concurrent reads.
pub trait TargetRoster: Send + Sync + 'static {
    /// Enumerates every candidate target.
    fn candidates(&self) -> Vec<Candidate>;

    /// Resolves an entity to its current position.
    fn locate(&self, entity: EntityId) -> Option<Vector3<f64>> {
        self.candidates()
            .into_iter()
            .find(|c| c.entity == entity)
            .map(|c| c.position)
    }
}
