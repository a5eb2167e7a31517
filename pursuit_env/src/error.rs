//! Error types for the Pursuit environment abstraction.

use thiserror::Error;

/// Failures reported by a [`PathOracle`](crate::PathOracle).
///
/// All variants are recoverable: the controller stays in its previous
/// state and retries on the next staleness check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// No route exists between start and goal
    #[error("no path found")]
    NoPath,

    /// The oracle gave up before finding a route
    #[error("path computation timed out")]
    Timeout,

    /// The oracle produced a path too short to follow
    #[error("path has {0} waypoints, need at least 2")]
    TooShort(usize),

    /// The oracle itself failed (host error, invalid input, ...)
    #[error("path oracle error: {0}")]
    Oracle(String),
}

impl PathError {
    /// Creates an oracle error.
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }
}
