//! Path oracle abstraction and the waypoint data it produces.

use async_trait::async_trait;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PathError;

/// What the agent must do to reach a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WaypointAction {
    /// Walk
    #[default]
    Walk,

    /// Jump while heading to this waypoint
    Jump,
}

/// A single point on a computed path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// World-space position
    pub position: Vector3<f64>,

    /// Action required to reach it
    pub action: WaypointAction,
}

impl Waypoint {
    /// Creates a walking waypoint.
    pub fn walk(position: Vector3<f64>) -> Self {
        Self {
            position,
            action: WaypointAction::Walk,
        }
    }

    /// Creates a waypoint that requires a jump.
    pub fn jump(position: Vector3<f64>) -> Self {
        Self {
            position,
            action: WaypointAction::Jump,
        }
    }

    /// Returns true if reaching this waypoint requires a jump.
    pub fn requires_jump(&self) -> bool {
        self.action == WaypointAction::Jump
    }
}

/// An ordered, immutable waypoint sequence.
///
/// Index 0 is the start position the oracle was queried with. Paths are
/// replaced wholesale on recomputation, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    waypoints: Vec<Waypoint>,
}

impl Path {
    /// Creates a path; fails if it has fewer than two waypoints.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, PathError> {
        if waypoints.len() < 2 {
            return Err(PathError::TooShort(waypoints.len()));
        }
        Ok(Self { waypoints })
    }

    /// All waypoints in travel order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Number of waypoints (always at least 2).
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint at `index`.
    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// Final waypoint (the goal the path was computed for).
    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }
}

/// A successful path computation.
///
/// `blocked` yields waypoint indices that the host reports as obstructed
/// while the path is active. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ComputedPath {
    /// The route
    pub path: Path,

    /// Asynchronous `Blocked(waypointIndex)` signal
    pub blocked: mpsc::UnboundedReceiver<usize>,
}

/// Asynchronous path computation service.
///
/// # Implementations
///
/// - **Production**: wraps the host's navmesh query
/// - **Simulation**: `LinePathOracle`
#[async_trait]
pub trait PathOracle: Send + Sync + 'static {
    /// Computes a path from `start` to `goal`.
    ///
    /// Suspends until the oracle responds; failures are recoverable.
    async fn compute(&self, start: Vector3<f64>, goal: Vector3<f64>) -> Result<ComputedPath, PathError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rejects_single_waypoint() {
        let result = Path::new(vec![Waypoint::walk(Vector3::zeros())]);
        assert_eq!(result, Err(PathError::TooShort(1)));
    }

    #[test]
    fn test_path_accessors() {
        let path = Path::new(vec![
            Waypoint::walk(Vector3::zeros()),
            Waypoint::jump(Vector3::new(0.0, 2.0, 4.0)),
        ])
        .expect("two waypoints is a valid path");

        assert_eq!(path.len(), 2);
        assert!(!path.is_empty());
        assert!(path.get(1).map(Waypoint::requires_jump).unwrap_or(false));
        assert_eq!(path.last().map(|w| w.position.z), Some(4.0));
        assert!(path.get(2).is_none());
    }
}
