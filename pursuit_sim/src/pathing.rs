//! Straight-line path oracle with fault injection.

use async_trait::async_trait;
use nalgebra::Vector3;
use pursuit_env::{ComputedPath, Path, PathError, PathOracle, Waypoint};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::terrain::TerrainWorld;

struct LineState {
    failure: Option<PathError>,
    calls: usize,
    blocked: Option<mpsc::UnboundedSender<usize>>,
    last: Option<Path>,
}

/// Plans a straight segment from start to goal, cut into waypoints.
///
/// Waypoint 0 is the start. A waypoint rising more than `jump_rise` above
/// its predecessor is marked as a jump, and so is a waypoint over a gap in
/// the terrain (when one is attached).
pub struct LinePathOracle {
    spacing: f64,
    jump_rise: f64,
    terrain: Option<Arc<TerrainWorld>>,
    state: Mutex<LineState>,
}

impl LinePathOracle {
    /// Creates an oracle emitting waypoints at most `spacing` apart.
    pub fn new(spacing: f64) -> Self {
        Self {
            spacing: spacing.max(f64::EPSILON),
            jump_rise: 1.5,
            terrain: None,
            state: Mutex::new(LineState {
                failure: None,
                calls: 0,
                blocked: None,
                last: None,
            }),
        }
    }

    /// Sets the rise that turns a waypoint into a jump.
    pub fn with_jump_rise(mut self, rise: f64) -> Self {
        self.jump_rise = rise;
        self
    }

    /// Marks waypoints without ground beneath them as jumps.
    pub fn with_terrain(mut self, terrain: Arc<TerrainWorld>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following computation fail with `failure` (`None` heals).
    pub fn fail_with(&self, failure: Option<PathError>) {
        self.lock().failure = failure;
    }

    /// Number of computations requested so far.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// The most recently produced path.
    pub fn last_path(&self) -> Option<Path> {
        self.lock().last.clone()
    }

    /// Reports waypoint `index` of the latest path as blocked.
    ///
    /// Returns false if no subscriber is listening any more.
    pub fn fire_blocked(&self, index: usize) -> bool {
        self.lock().blocked.as_ref().map_or(false, |tx| tx.send(index).is_ok())
    }

    /// Builds the waypoint list for a segment.
    pub fn plan(&self, start: Vector3<f64>, goal: Vector3<f64>) -> Result<Path, PathError> {
        let length = (goal - start).norm();
        let segments = ((length / self.spacing).ceil() as usize).max(1);

        let mut waypoints = Vec::with_capacity(segments + 1);
        let mut previous = start;
        for i in 0..=segments {
            let position = start.lerp(&goal, i as f64 / segments as f64);
            let gap = self
                .terrain
                .as_ref()
                .map_or(false, |t| t.surface_below(&position).is_none());
            let waypoint = if i > 0 && (gap || position.y - previous.y > self.jump_rise) {
                Waypoint::jump(position)
            } else {
                Waypoint::walk(position)
            };
            waypoints.push(waypoint);
            previous = position;
        }
        Path::new(waypoints)
    }
}

#[async_trait]
impl PathOracle for LinePathOracle {
    async fn compute(&self, start: Vector3<f64>, goal: Vector3<f64>) -> Result<ComputedPath, PathError> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(failure) = state.failure.clone() {
            debug!(call = state.calls, %failure, "injected path failure");
            return Err(failure);
        }

        let path = self.plan(start, goal)?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.blocked = Some(tx);
        state.last = Some(path.clone());
        debug!(call = state.calls, waypoints = path.len(), "line path planned");

        Ok(ComputedPath { path, blocked: rx })
    }
}
