//! Chase configuration: check toggles and tuning constants.

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, TuningError};

/// Toggles controlling which relation checks gate direct chase.
///
/// Each agent keeps two copies: the defaults captured at creation and a
/// live copy that the control loop may override temporarily
/// (`check_direct_move` only). See [`ChaseConfig::restore_direct_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseConfig {
    /// Master switch: evaluate relations at all
    pub check_direct_move: bool,

    /// Block direct chase on steep slopes
    pub check_slope: bool,

    /// Block direct chase beyond the chase radius
    pub check_distance: bool,

    /// Block direct chase toward an edge
    pub check_drop: bool,

    /// Block direct chase without line of sight
    pub check_sight: bool,

    /// Periodically switch to the nearest targetable candidate
    pub dynamic_retarget: bool,
}

impl ChaseConfig {
    /// A configuration with every gating check turned off.
    ///
    /// Direct chase is then always viable (relations are still evaluated).
    pub fn permissive() -> Self {
        Self {
            check_direct_move: true,
            check_slope: false,
            check_distance: false,
            check_drop: false,
            check_sight: false,
            dynamic_retarget: false,
        }
    }

    /// Puts the direct-move switch back to its configured default.
    pub fn restore_direct_move(&mut self, defaults: &ChaseConfig) {
        self.check_direct_move = defaults.check_direct_move;
    }
}

impl Default for ChaseConfig {
    fn default() -> Self {
        Self {
            check_direct_move: true,
            check_slope: true,
            check_distance: true,
            check_drop: true,
            check_sight: true,
            dynamic_retarget: false,
        }
    }
}

/// Numeric constants of the chase controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseTuning {
    /// Direct chase only within this distance (default: 20)
    pub chase_radius: f64,

    /// A path whose end drifted this far from the target is stale (default: 15)
    pub recompute_radius: f64,

    /// Steepest rise/run allowed for direct chase (default: 0.5)
    pub max_slope: f64,

    /// How far ahead of the agent the drop probe starts (default: 8)
    pub drop_probe_forward: f64,

    /// Length of the downward drop probe (default: 5)
    pub drop_probe_depth: f64,

    /// Elevation loss that counts as a fall (default: 8)
    pub fall_threshold: f64,

    /// Fraction of max speed under which the agent may be stuck (default: 0.3)
    pub stuck_speed_ratio: f64,

    /// Stuck detection only when the path end is this close to the target (default: 3)
    pub stuck_staleness: f64,

    /// Minimum polling interval in seconds (default: 0.1)
    pub base_tick: f64,

    /// Beyond this distance polling slows down (default: 25)
    pub far_distance: f64,

    /// Seconds added per unit of distance when far (default: 0.01)
    pub distance_tick_scale: f64,

    /// Cap on the added seconds (default: 2)
    pub max_extra_tick: f64,

    /// Sleep in seconds while idle (default: 0.1)
    pub idle_tick: f64,
}

impl Default for ChaseTuning {
    fn default() -> Self {
        Self {
            chase_radius: 20.0,
            recompute_radius: 15.0,
            max_slope: 0.5,
            drop_probe_forward: 8.0,
            drop_probe_depth: 5.0,
            fall_threshold: 8.0,
            stuck_speed_ratio: 0.3,
            stuck_staleness: 3.0,
            base_tick: 0.1,
            far_distance: 25.0,
            distance_tick_scale: 0.01,
            max_extra_tick: 2.0,
            idle_tick: 0.1,
        }
    }
}

impl ChaseTuning {
    /// Rejects constants the control loop cannot run with.
    ///
    /// Every constant must be finite and non-negative; the two polling
    /// intervals must be strictly positive.
    pub fn validate(&self) -> Result<(), TuningError> {
        let non_negative = [
            ("chase_radius", self.chase_radius),
            ("recompute_radius", self.recompute_radius),
            ("max_slope", self.max_slope),
            ("drop_probe_forward", self.drop_probe_forward),
            ("drop_probe_depth", self.drop_probe_depth),
            ("fall_threshold", self.fall_threshold),
            ("stuck_speed_ratio", self.stuck_speed_ratio),
            ("stuck_staleness", self.stuck_staleness),
            ("far_distance", self.far_distance),
            ("distance_tick_scale", self.distance_tick_scale),
            ("max_extra_tick", self.max_extra_tick),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TuningError {
                    field,
                    expected: "finite and non-negative",
                    value,
                });
            }
        }

        for (field, value) in [("base_tick", self.base_tick), ("idle_tick", self.idle_tick)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TuningError {
                    field,
                    expected: "finite and positive",
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Everything an agent is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agent's logical name (for logging)
    pub name: String,

    /// Check toggles
    pub config: ChaseConfig,

    /// Numeric constants
    pub tuning: ChaseTuning,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "pursuit-agent".to_string(),
            config: ChaseConfig::default(),
            tuning: ChaseTuning::default(),
        }
    }
}

impl AgentSettings {
    /// Settings with the given check toggles and default tuning.
    pub fn with_config(config: ChaseConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Parses settings from JSON; missing fields take their defaults.
    ///
    /// The tuning constants are validated after parsing.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.tuning.validate()?;
        Ok(settings)
    }
}
