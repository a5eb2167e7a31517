//! Path State Machine - owns the current path and its waypoint cursor.
//!
//! ```text
//!            path computed (>= 2 waypoints)
//!   Idle ─────────────────────────────────► Pathfinding ◄──┐ blocked ahead /
//!    ▲                                        │   ▲        │ fell / stale /
//!    │ target cleared / disabled              │   │        │ completed
//!    │                                        │   └────────┘
//!    │                       direct viable    ▼   │ direct no longer viable
//!    └──────────────────────────────────── Following
//! ```
//!
//! Cursor indices are 0-based. Waypoint 0 is the agent's own start
//! position, so a fresh path starts with the cursor at 1.

use nalgebra::Vector3;
use pursuit_env::{Path, Waypoint};
use serde::{Deserialize, Serialize};

use crate::config::ChaseTuning;
use crate::geometry::squared_distance;

/// Movement mode of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    /// No target, or disabled
    Idle,

    /// Following computed waypoints
    Pathfinding,

    /// Chasing the target directly
    Following,
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PathStatus::Idle => "Idle",
            PathStatus::Pathfinding => "Pathfinding",
            PathStatus::Following => "Following",
        };
        f.write_str(name)
    }
}

/// What a movement-completion notification means for the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrivalOutcome {
    /// No path is being followed; the notification is stale
    Stale,

    /// The agent ended up far below the waypoint without a jump
    Fell {
        /// Elevation lost relative to the waypoint
        drop: f64,
    },

    /// Cursor moved on; head for `next`
    Advanced {
        /// Waypoint just reached
        reached: Waypoint,
        /// New current waypoint
        next: Waypoint,
    },

    /// The final waypoint was reached
    Complete {
        /// The final waypoint
        reached: Waypoint,
    },
}

/// Path lifecycle for one agent.
#[derive(Debug, Clone)]
pub struct PathState {
    status: PathStatus,
    path: Option<Path>,
    cursor: usize,
    exhausted: bool,
    generation: u64,
}

impl Default for PathState {
    fn default() -> Self {
        Self::new()
    }
}

impl PathState {
    /// Creates an idle state with no path.
    pub fn new() -> Self {
        Self {
            status: PathStatus::Idle,
            path: None,
            cursor: 1,
            exhausted: false,
            generation: 0,
        }
    }

    /// Current movement mode.
    pub fn status(&self) -> PathStatus {
        self.status
    }

    /// The path being followed, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// Index of the waypoint currently headed for.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once the final waypoint has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Increases every time a new path is adopted.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waypoint currently headed for, unless the path is exhausted.
    pub fn current_waypoint(&self) -> Option<&Waypoint> {
        if self.exhausted {
            return None;
        }
        self.path.as_ref().and_then(|p| p.get(self.cursor))
    }

    /// Squared distance from the path's final waypoint to `target`.
    ///
    /// `None` when there is no path.
    pub fn staleness(&self, target: &Vector3<f64>) -> Option<f64> {
        self.path
            .as_ref()
            .and_then(Path::last)
            .map(|end| squared_distance(&end.position, target))
    }

    /// Replaces the path and starts following it from waypoint 1.
    ///
    /// Returns the previous status.
    pub fn adopt(&mut self, path: Path) -> PathStatus {
        let previous = self.status;
        self.path = Some(path);
        self.cursor = 1;
        self.exhausted = false;
        self.generation += 1;
        self.status = PathStatus::Pathfinding;
        previous
    }

    /// Switches to direct chase, dropping the path.
    ///
    /// Returns the previous status.
    pub fn enter_following(&mut self) -> PathStatus {
        let previous = self.status;
        self.path = None;
        self.cursor = 1;
        self.exhausted = false;
        self.status = PathStatus::Following;
        previous
    }

    /// Leaves direct chase without a path yet; the next computation decides.
    pub fn leave_following(&mut self) -> PathStatus {
        let previous = self.status;
        if previous == PathStatus::Following {
            self.status = PathStatus::Pathfinding;
        }
        previous
    }

    /// Back to idle, dropping the path. Returns the previous status.
    pub fn reset(&mut self) -> PathStatus {
        let previous = self.status;
        self.path = None;
        self.cursor = 1;
        self.exhausted = false;
        self.status = PathStatus::Idle;
        previous
    }

    /// Whether a `Blocked(index)` notification warrants recomputation.
    ///
    /// Blockages behind the cursor refer to segments already walked.
    pub fn blockage_requires_recompute(&self, index: usize) -> bool {
        self.status == PathStatus::Pathfinding && self.path.is_some() && index >= self.cursor
    }

    /// Applies a movement-completion notification at `agent` position.
    pub fn arrive(&mut self, agent: &Vector3<f64>, tuning: &ChaseTuning) -> ArrivalOutcome {
        if self.status != PathStatus::Pathfinding || self.exhausted {
            return ArrivalOutcome::Stale;
        }
        let Some(path) = self.path.as_ref() else {
            return ArrivalOutcome::Stale;
        };
        let Some(current) = path.get(self.cursor).copied() else {
            return ArrivalOutcome::Stale;
        };

        let drop = current.position.y - agent.y;
        if drop > tuning.fall_threshold && !current.requires_jump() {
            return ArrivalOutcome::Fell { drop };
        }

        match path.get(self.cursor + 1).copied() {
            Some(next) => {
                self.cursor += 1;
                ArrivalOutcome::Advanced { reached: current, next }
            }
            None => {
                self.exhausted = true;
                ArrivalOutcome::Complete { reached: current }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn straight(len: usize) -> Path {
        let waypoints = (0..len)
            .map(|i| Waypoint::walk(Vector3::new(0.0, 0.0, i as f64 * 4.0)))
            .collect();
        Path::new(waypoints).expect("len >= 2")
    }

    #[test]
    fn test_starts_idle() {
        let state = PathState::new();
        assert_eq!(state.status(), PathStatus::Idle);
        assert!(state.path().is_none());
        assert!(state.staleness(&Vector3::zeros()).is_none());
    }

    #[test]
    fn test_adopt_starts_at_second_waypoint() {
        let mut state = PathState::new();
        assert_eq!(state.adopt(straight(4)), PathStatus::Idle);

        assert_eq!(state.status(), PathStatus::Pathfinding);
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.generation(), 1);
        assert_eq!(state.current_waypoint().map(|w| w.position.z), Some(4.0));
    }

    #[test]
    fn test_arrivals_walk_to_completion() {
        let tuning = ChaseTuning::default();
        let mut state = PathState::new();
        state.adopt(straight(3));

        let here = Vector3::new(0.0, 0.0, 4.0);
        match state.arrive(&here, &tuning) {
            ArrivalOutcome::Advanced { reached, next } => {
                assert_eq!(reached.position.z, 4.0);
                assert_eq!(next.position.z, 8.0);
            }
            other => panic!("expected advance, got {other:?}"),
        }
        assert_eq!(state.cursor(), 2);

        let end = Vector3::new(0.0, 0.0, 8.0);
        assert!(matches!(state.arrive(&end, &tuning), ArrivalOutcome::Complete { .. }));
        assert!(state.is_exhausted());
        assert_eq!(state.cursor(), 2);
        assert!(state.current_waypoint().is_none());

        assert_eq!(state.arrive(&end, &tuning), ArrivalOutcome::Stale);
    }

    #[test]
    fn test_fall_detected_unless_jump() {
        let tuning = ChaseTuning::default();
        let mut state = PathState::new();
        state.adopt(straight(4));

        let below = Vector3::new(0.0, -10.0, 4.0);
        assert_eq!(state.arrive(&below, &tuning), ArrivalOutcome::Fell { drop: 10.0 });
        assert_eq!(state.cursor(), 1, "a fall does not advance");

        let jumpy = Path::new(vec![
            Waypoint::walk(Vector3::zeros()),
            Waypoint::jump(Vector3::new(0.0, 0.0, 4.0)),
            Waypoint::walk(Vector3::new(0.0, 0.0, 8.0)),
        ])
        .expect("valid");
        state.adopt(jumpy);
        assert!(matches!(state.arrive(&below, &tuning), ArrivalOutcome::Advanced { .. }));
    }

    #[test]
    fn test_blockage_behind_cursor_is_ignored() {
        let tuning = ChaseTuning::default();
        let mut state = PathState::new();
        state.adopt(straight(4));
        state.arrive(&Vector3::new(0.0, 0.0, 4.0), &tuning);
        assert_eq!(state.cursor(), 2);

        assert!(state.blockage_requires_recompute(3));
        assert!(state.blockage_requires_recompute(2));
        assert!(!state.blockage_requires_recompute(1));
    }

    #[test]
    fn test_blockage_without_path_is_ignored() {
        let mut state = PathState::new();
        assert!(!state.blockage_requires_recompute(5));
        state.enter_following();
        assert!(!state.blockage_requires_recompute(5));
    }

    #[test]
    fn test_following_and_reset() {
        let mut state = PathState::new();
        state.adopt(straight(2));
        assert_eq!(state.enter_following(), PathStatus::Pathfinding);
        assert!(state.path().is_none());
        assert_eq!(state.leave_following(), PathStatus::Following);
        assert_eq!(state.status(), PathStatus::Pathfinding);
        assert_eq!(state.reset(), PathStatus::Pathfinding);
        assert_eq!(state.status(), PathStatus::Idle);
    }

    #[test]
    fn test_staleness_measures_path_end() {
        let mut state = PathState::new();
        state.adopt(straight(3));
        assert_eq!(state.staleness(&Vector3::new(0.0, 0.0, 11.0)), Some(9.0));
    }

    proptest! {
        #[test]
        fn prop_cursor_never_exceeds_path(len in 2usize..12, arrivals in 0usize..40) {
            let tuning = ChaseTuning::default();
            let mut state = PathState::new();
            state.adopt(straight(len));
            for _ in 0..arrivals {
                let here = state.current_waypoint().map(|w| w.position).unwrap_or_else(Vector3::zeros);
                state.arrive(&here, &tuning);
                prop_assert!(state.cursor() < len);
            }
        }
    }
}
