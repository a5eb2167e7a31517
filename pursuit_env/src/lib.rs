//! Pursuit Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the chase
//! controller to run against a real host (tokio + engine bindings) or the
//! deterministic simulator.
//!
//! # Core Concept: Collaborators as Traits
//!
//! Everything the controller does not own is a trait:
//! - Time and tasks (`PursuitContext`)
//! - Physical movement (`MovementExecutor`, `Body`)
//! - Collision queries (`GeometryOracle`)
//! - Route planning (`PathOracle`)
//! - Target enumeration (`TargetRoster`)
//!
//! # Example
//!
//! ```ignore
//! use pursuit_env::{PursuitContext, MovementExecutor};
//!
//! async fn patrol<Ctx: PursuitContext>(ctx: &Ctx, mover: &dyn MovementExecutor) {
//!     loop {
//!         let _done = mover.move_to(Vector3::new(10.0, 0.0, 0.0), None);
//!         ctx.sleep(Duration::from_millis(100)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod geometry;
mod movement;
mod pathing;
mod roster;
mod tokio_impl;
mod types;

pub use context::PursuitContext;
pub use error::PathError;
pub use geometry::{GeometryOracle, RayHit, RaycastFilter};
pub use movement::{Body, MoveCompletion, MovementExecutor};
pub use pathing::{ComputedPath, Path, PathOracle, Waypoint, WaypointAction};
pub use roster::{Candidate, TargetRoster};
pub use tokio_impl::TokioContext;
pub use types::EntityId;
