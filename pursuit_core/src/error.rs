//! Error types for chase agents.

use pursuit_env::EntityId;
use thiserror::Error;

/// Errors surfaced by the agent lifecycle API.
///
/// Path computation failures are not here: they are recovered inside the
/// control loop and only show up as the absence of a path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChaseError {
    /// The entity has no root reference point
    #[error("entity {0} has no root part")]
    MissingRoot(EntityId),

    /// The entity has no motion controller
    #[error("entity {0} has no motion controller")]
    MissingMotion(EntityId),

    /// The settings carry an unusable tuning constant
    #[error("invalid settings: {0}")]
    InvalidTuning(#[from] TuningError),

    /// The agent handle was already destroyed
    #[error("agent {0} already destroyed")]
    Destroyed(EntityId),
}

/// A tuning constant outside its domain.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("tuning.{field} must be {expected}, got {value}")]
pub struct TuningError {
    /// Name of the offending field
    pub field: &'static str,

    /// What the field has to be
    pub expected: &'static str,

    /// The rejected value
    pub value: f64,
}

/// Errors raised while loading [`AgentSettings`](crate::AgentSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Not valid settings JSON
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// Parsed, but a tuning constant is unusable
    #[error(transparent)]
    Tuning(#[from] TuningError),
}
