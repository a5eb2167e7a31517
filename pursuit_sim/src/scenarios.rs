//! Named chase scenarios.

use crate::error::SimError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// CHASE-001: Open plain, static target within reach
    OpenField,

    /// CHASE-002: Wall between agent and target
    Wall,

    /// CHASE-003: Chasm between agent and target
    Cliff,

    /// CHASE-004: Target running away from the agent
    MovingTarget,

    /// CHASE-005: Dynamic retargeting among several candidates
    Retarget,

    /// CHASE-006: Path blockages ahead of and behind the cursor
    Blocked,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::OpenField,
            ScenarioId::Wall,
            ScenarioId::Cliff,
            ScenarioId::MovingTarget,
            ScenarioId::Retarget,
            ScenarioId::Blocked,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OpenField => "open_field",
            ScenarioId::Wall => "wall",
            ScenarioId::Cliff => "cliff",
            ScenarioId::MovingTarget => "moving_target",
            ScenarioId::Retarget => "retarget",
            ScenarioId::Blocked => "blocked",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::OpenField => "Flat plain, target 15 units away: direct chase and arrival",
            ScenarioId::Wall => "Wall blocks sight: path first, direct chase once past it",
            ScenarioId::Cliff => "Chasm ahead: drop probe vetoes direct chase",
            ScenarioId::MovingTarget => "Target walks away: stale paths recomputed until caught",
            ScenarioId::Retarget => "Nearest targetable candidate wins, non-targetable ones skipped",
            ScenarioId::Blocked => "Blockage ahead of the cursor recomputes, behind is ignored",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open_field" | "openfield" | "chase-001" => Ok(ScenarioId::OpenField),
            "wall" | "chase-002" => Ok(ScenarioId::Wall),
            "cliff" | "chasm" | "chase-003" => Ok(ScenarioId::Cliff),
            "moving_target" | "movingtarget" | "chase-004" => Ok(ScenarioId::MovingTarget),
            "retarget" | "chase-005" => Ok(ScenarioId::Retarget),
            "blocked" | "chase-006" => Ok(ScenarioId::Blocked),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
