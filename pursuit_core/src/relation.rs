//! Relation Evaluator - spatial relations between an agent and its target.
//!
//! A [`RelationSnapshot`] is recomputed on every decision and never stored
//! beyond it (the agent keeps the latest one for inspection only).

use nalgebra::Vector3;
use pursuit_env::{GeometryOracle, RaycastFilter};
use serde::{Deserialize, Serialize};

use crate::config::{ChaseConfig, ChaseTuning};
use crate::geometry::{flat_direction, slope, squared_distance};

/// Point-in-time relations between agent and target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    /// Target is within the chase radius
    pub in_chase_distance: bool,

    /// Nothing obstructs the straight segment to the target
    pub line_of_sight_clear: bool,

    /// Ground exists ahead of the agent toward the target
    pub drop_safe: bool,

    /// Rise over run from agent to target
    pub slope: f64,
}

/// Evaluates the relations between `agent` and `target`.
///
/// Returns `None` when direct-move checking is switched off in `config`.
///
/// The drop probe starts `drop_probe_forward` units ahead of the agent along
/// the flattened direction to the target and casts `drop_probe_depth` units
/// straight down; finding nothing means an edge lies ahead.
pub fn evaluate(
    agent: &Vector3<f64>,
    target: &Vector3<f64>,
    geometry: &dyn GeometryOracle,
    filter: &RaycastFilter,
    config: &ChaseConfig,
    tuning: &ChaseTuning,
) -> Option<RelationSnapshot> {
    if !config.check_direct_move {
        return None;
    }

    let in_chase_distance = squared_distance(target, agent) < tuning.chase_radius.powi(2);
    let line_of_sight_clear = geometry.raycast(*agent, target - agent, filter).is_none();

    let ahead = flat_direction(agent, target).unwrap_or_else(Vector3::zeros);
    let probe_origin = agent + ahead * tuning.drop_probe_forward;
    let probe = Vector3::new(0.0, -tuning.drop_probe_depth, 0.0);
    let drop_safe = geometry.raycast(probe_origin, probe, filter).is_some();

    Some(RelationSnapshot {
        in_chase_distance,
        line_of_sight_clear,
        drop_safe,
        slope: slope(agent, target),
    })
}

/// True iff every enabled check passes. Disabled checks never block.
pub fn can_move_direct(snapshot: &RelationSnapshot, config: &ChaseConfig, tuning: &ChaseTuning) -> bool {
    (!config.check_slope || snapshot.slope < tuning.max_slope)
        && (!config.check_distance || snapshot.in_chase_distance)
        && (!config.check_drop || snapshot.drop_safe)
        && (!config.check_sight || snapshot.line_of_sight_clear)
}

/// Direct-chase decision from an optional snapshot; no snapshot means no.
pub fn direct_move_viable(
    snapshot: Option<&RelationSnapshot>,
    config: &ChaseConfig,
    tuning: &ChaseTuning,
) -> bool {
    snapshot.map_or(false, |s| can_move_direct(s, config, tuning))
}
