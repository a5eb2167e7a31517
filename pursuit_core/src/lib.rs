//! Pursuit Core - chase and path-following controller for NPC agents.
//!
//! An agent either runs straight at its target (`Following`) or walks a
//! computed path waypoint by waypoint (`Pathfinding`). Which mode applies is
//! decided from cheap spatial relations re-evaluated on every tick:
//! 1. **Distance**: is the target inside the chase radius?
//! 2. **Sight**: is the straight segment free of obstacles?
//! 3. **Drop**: is there ground ahead, toward the target?
//! 4. **Slope**: is the target's elevation climbable?
//!
//! Everything physical (movement, raycasts, path planning, target lookup)
//! comes from the collaborator traits in `pursuit_env`.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod path_state;
pub mod relation;
pub mod target;

mod control;

// Re-export key types for convenience
pub use agent::{ChaseAgent, Oracles};
pub use config::{AgentSettings, ChaseConfig, ChaseTuning};
pub use error::{ChaseError, SettingsError, TuningError};
pub use events::{AgentEvent, EventBus, PursuitEvent, EVENT_CAPACITY};
pub use path_state::{ArrivalOutcome, PathState, PathStatus};
pub use relation::RelationSnapshot;
pub use target::Target;
