//! Movement executor and body abstractions.
//!
//! The executor is the physical side of an agent: it walks toward a point,
//! jumps, and reports speed. The controller never moves an agent itself.

use crate::types::EntityId;
use nalgebra::Vector3;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Completion signal of a movement command.
///
/// Resolves to `true` when the executor reached the point and `false` when
/// it gave up. A dropped sender (the command was superseded) resolves to an
/// error, which the controller treats as "no notification".
pub type MoveCompletion = oneshot::Receiver<bool>;

/// Physical movement executor for one agent.
///
/// # Implementations
///
/// - **Production**: wraps the host's character controller
/// - **Simulation**: `KinematicMover`, `ScriptedMover`
pub trait MovementExecutor: Send + Sync + 'static {
    /// Starts moving toward `point`, optionally homing on `target` body.
    ///
    /// Issuing a new command supersedes the previous one.
    fn move_to(&self, point: Vector3<f64>, target: Option<EntityId>) -> MoveCompletion;

    /// Performs a jump.
    fn jump(&self);

    /// Current root position.
    fn position(&self) -> Vector3<f64>;

    /// Current movement speed (units per second).
    fn speed(&self) -> f64;

    /// Configured maximum movement speed (units per second).
    fn max_speed(&self) -> f64;

    /// Stops in place by targeting the current position.
    fn stop(&self) {
        let here = self.position();
        drop(self.move_to(here, None));
    }
}

/// A host entity that may be put under chase control.
///
/// Construction validates that the body exposes a root reference point and
/// a motion controller before any agent state is created.
pub trait Body: Send + Sync + 'static {
    /// Host identifier of this entity.
    fn entity(&self) -> EntityId;

    /// Position of the root reference point, if the entity has one.
    fn root_position(&self) -> Option<Vector3<f64>>;

    /// The motion controller driving this entity, if any.
    fn motion(&self) -> Option<Arc<dyn MovementExecutor>>;

    /// Takes the entity away from any external physical owner
    /// (network physics authority, ragdoll controller, ...).
    fn release_physics_ownership(&self) {}
}
