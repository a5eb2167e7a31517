//! Scenario runner - executes chase scenarios on the virtual clock.

use crate::error::SimError;
use crate::exporter::{SimEvent, SimExport};
use crate::scenarios::ScenarioId;
use crate::terrain::{TerrainWorld, ROOT_HEIGHT};
use crate::world::{settle, SimAgent, SimConfig, SimWorld};

use nalgebra::Vector3;
use pursuit_core::{AgentSettings, ChaseConfig, PathStatus, PursuitEvent, Target};
use pursuit_env::{EntityId, MovementExecutor};
use tracing::{debug, info, warn};

/// How close an agent must end up to its target.
pub const CATCH_DISTANCE: f64 = 2.0;

/// Export a frame every this many ticks.
pub const EXPORT_INTERVAL: u64 = 10;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of agents simulated
    pub agent_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution, summed over agents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// Path computations requested from the oracle
    pub path_requests: usize,

    /// Paths adopted
    pub paths_computed: usize,

    /// Intermediate waypoints reached
    pub waypoints_reached: usize,

    /// Movement mode changes
    pub status_changes: usize,

    /// In-place stops commanded
    pub stops: usize,
}

impl ScenarioMetrics {
    fn collect(agents: &[SimAgent]) -> Self {
        let mut metrics = Self::default();
        for sim in agents {
            metrics.path_requests += sim.paths.calls();
            metrics.paths_computed += sim.count(|e| matches!(e, PursuitEvent::PathComputed(_)));
            metrics.waypoints_reached += sim.count(|e| matches!(e, PursuitEvent::WaypointReached(_)));
            metrics.status_changes += sim.count(|e| matches!(e, PursuitEvent::PathStatusChanged(_)));
            metrics.stops += sim.count(|e| matches!(e, PursuitEvent::Stopped));
        }
        metrics
    }
}

/// Statuses in the order an agent went through them.
fn status_history(sim: &SimAgent) -> Vec<PathStatus> {
    sim.log
        .iter()
        .filter_map(|e| match e {
            PursuitEvent::PathStatusChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

/// Index of the first event matching `pred`.
fn first_event(sim: &SimAgent, pred: impl Fn(&PursuitEvent) -> bool) -> Option<usize> {
    sim.log.iter().position(pred)
}

/// Outcome of one scenario's assertions.
type Verdict = Result<(), String>;

fn check(condition: bool, reason: impl FnOnce() -> String) -> Verdict {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Every agent ended within [`CATCH_DISTANCE`] of its target.
fn all_caught(world: &SimWorld) -> Verdict {
    for sim in &world.agents {
        let distance = sim.distance_to_target(&world.oracle);
        check(distance.map_or(false, |d| d < CATCH_DISTANCE), || {
            format!("agent {} ended {:?} from its target", sim.agent.entity(), distance)
        })?;
    }
    Ok(())
}

/// A path was adopted before the agent ever chased directly.
fn pathfinding_first(sim: &SimAgent) -> Verdict {
    let computed = first_event(sim, |e| matches!(e, PursuitEvent::PathComputed(_)));
    let following = first_event(sim, |e| matches!(e, PursuitEvent::PathStatusChanged(PathStatus::Following)));
    match (computed, following) {
        (Some(c), Some(f)) if c < f => Ok(()),
        (Some(_), None) => Ok(()),
        _ => Err(format!(
            "agent {} chased directly before computing a path ({:?})",
            sim.agent.entity(),
            status_history(sim)
        )),
    }
}

/// Runs chase scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of agents
    num_agents: usize,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Settings every agent is created with
    settings: AgentSettings,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self {
            seed,
            num_agents: num_agents.max(1),
            tick_rate_hz: 30,
            max_duration_secs: 20.0,
            settings: AgentSettings::default(),
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the agent settings (scenarios may still override check toggles).
    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    fn config(&self, settings: AgentSettings) -> SimConfig {
        SimConfig {
            seed: self.seed,
            num_agents: self.num_agents,
            tick_rate_hz: self.tick_rate_hz,
            max_duration_secs: self.max_duration_secs,
            settings,
            ..SimConfig::default()
        }
    }

    /// Runs a scenario on a fresh single-threaded runtime.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(self.run_async(scenario, None))
    }

    /// Runs a scenario and records frames into `export`.
    pub fn run_with_export(&self, scenario: ScenarioId, export: &mut SimExport) -> Result<ScenarioResult, SimError> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let result = runtime.block_on(self.run_async(scenario, Some(&mut *export)))?;
        export.finalize(result.passed, result.failure_reason.clone());
        Ok(result)
    }

    /// Runs a scenario on the ambient runtime.
    ///
    /// The runtime must be single-threaded for the run to be reproducible.
    pub async fn run_async(
        &self,
        scenario: ScenarioId,
        export: Option<&mut SimExport>,
    ) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let (mut world, verdict) = match scenario {
            ScenarioId::OpenField => self.run_open_field(export).await?,
            ScenarioId::Wall => self.run_wall(export).await?,
            ScenarioId::Cliff => self.run_cliff(export).await?,
            ScenarioId::MovingTarget => self.run_moving_target(export).await?,
            ScenarioId::Retarget => self.run_retarget(export).await?,
            ScenarioId::Blocked => self.run_blocked(export).await?,
        };

        let metrics = ScenarioMetrics::collect(&world.agents);
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            agent_count: world.agent_count(),
            failure_reason: verdict.err(),
            metrics,
        };
        world.shutdown().await?;

        match &result.failure_reason {
            None => info!(
                "✓ {} complete: {} paths, {} waypoints, {} mode changes",
                scenario.name(),
                result.metrics.paths_computed,
                result.metrics.waypoints_reached,
                result.metrics.status_changes
            ),
            Some(reason) => warn!("✗ {} failed: {}", scenario.name(), reason),
        }
        Ok(result)
    }

    /// Ticks `world` for the configured duration, recording frames.
    async fn simulate(&self, world: &mut SimWorld, export: Option<&mut SimExport>) {
        let ticks = world.target_ticks();
        self.simulate_ticks(world, ticks, export).await;
    }

    async fn simulate_ticks(&self, world: &mut SimWorld, ticks: u64, mut export: Option<&mut SimExport>) {
        for _ in 0..ticks {
            world.tick().await;
            let tick = world.tick_count();

            if let Some(export) = export.as_deref_mut() {
                if tick % EXPORT_INTERVAL == 0 {
                    export.add_frame(world.frame());
                }
            }

            if tick % u64::from(self.tick_rate_hz) == 0 {
                let statuses: Vec<PathStatus> = world
                    .agents
                    .iter()
                    .filter_map(|a| a.agent.status().ok())
                    .collect();
                debug!("  t={:.1}s | statuses={:?}", world.time(), statuses);
            }
        }
    }

    fn standing(x: f64, z: f64) -> Vector3<f64> {
        Vector3::new(x, ROOT_HEIGHT, z)
    }

    /// CHASE-001: OpenField - direct chase on a flat plain.
    ///
    /// **Assertion**: every agent enters `Following` without computing a
    /// path and ends next to the target.
    async fn run_open_field(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-001: OpenField - direct chase");

        let mut world = SimWorld::new(self.config(self.settings.clone()), TerrainWorld::plain(200.0));
        let target = world.oracle.spawn_jittered(Self::standing(0.0, 15.0), Vector3::zeros(), 2.0);
        world.spawn_agents(Self::standing(0.0, 0.0))?;
        world.set_target_all(Target::Entity(target))?;

        self.simulate(&mut world, export).await;

        let verdict = world
            .agents
            .iter()
            .try_for_each(|sim| {
                check(status_history(sim).first() == Some(&PathStatus::Following), || {
                    format!("agent {} did not chase directly: {:?}", sim.agent.entity(), status_history(sim))
                })?;
                check(sim.paths.calls() == 0, || {
                    format!("agent {} computed {} paths on open ground", sim.agent.entity(), sim.paths.calls())
                })
            })
            .and_then(|_| all_caught(&world));
        Ok((world, verdict))
    }

    /// CHASE-002: Wall - sight blocked by a wall.
    ///
    /// **Assertion**: a path is computed before any direct chase, and the
    /// agents still reach the target.
    async fn run_wall(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-002: Wall - obstructed line of sight");

        let mut world = SimWorld::new(self.config(self.settings.clone()), TerrainWorld::walled(200.0, 10.0, 30.0));
        let target = world.oracle.spawn_entity(Self::standing(0.0, 25.0), Vector3::zeros(), false);
        world.spawn_agents(Self::standing(0.0, 0.0))?;
        world.set_target_all(Target::Entity(target))?;

        self.simulate(&mut world, export).await;

        let verdict = world
            .agents
            .iter()
            .try_for_each(pathfinding_first)
            .and_then(|_| all_caught(&world));
        Ok((world, verdict))
    }

    /// CHASE-003: Cliff - chasm between agent and target.
    ///
    /// The target is within chase range with clear sight, so only the drop
    /// probe stands in the way.
    ///
    /// **Assertion**: the first decision is a path (the probe saw the
    /// chasm), the agents jump the gap and reach the target without falling.
    async fn run_cliff(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-003: Cliff - drop probe");

        let mut world = SimWorld::new(self.config(self.settings.clone()), TerrainWorld::chasm(200.0, 5.0, 13.0));
        let target = world.oracle.spawn_entity(Self::standing(0.0, 18.0), Vector3::zeros(), false);
        world.spawn_agents(Self::standing(0.0, 0.0))?;
        world.set_target_all(Target::Entity(target))?;

        world.tick().await;
        let mut verdict: Verdict = world.agents.iter().try_for_each(|sim| {
            let snapshot = sim.agent.snapshot().ok().flatten();
            check(snapshot.map_or(false, |s| !s.drop_safe), || {
                format!("agent {} did not see the chasm: {:?}", sim.agent.entity(), snapshot)
            })
        });

        let remaining = world.target_ticks().saturating_sub(1);
        self.simulate_ticks(&mut world, remaining, export).await;

        verdict = verdict
            .and_then(|_| world.agents.iter().try_for_each(pathfinding_first))
            .and_then(|_| all_caught(&world))
            .and_then(|_| {
                world.agents.iter().try_for_each(|sim| {
                    let y = sim.mover.position().y;
                    check(y > 0.0, || format!("agent {} fell to y={:.1}", sim.agent.entity(), y))
                })
            });
        Ok((world, verdict))
    }

    /// CHASE-004: MovingTarget - the target walks away.
    ///
    /// **Assertion**: the path goes stale and is recomputed at least once,
    /// and the agents catch up.
    async fn run_moving_target(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-004: MovingTarget - staleness recomputation");

        let mut world = SimWorld::new(self.config(self.settings.clone()), TerrainWorld::plain(1000.0));
        let target = world.oracle.spawn_entity(Self::standing(0.0, 40.0), Vector3::new(0.0, 0.0, 8.0), false);
        world.spawn_agents(Self::standing(0.0, 0.0))?;
        world.set_target_all(Target::Entity(target))?;

        self.simulate(&mut world, export).await;

        let verdict = world
            .agents
            .iter()
            .try_for_each(|sim| {
                let computed = sim.count(|e| matches!(e, PursuitEvent::PathComputed(_)));
                check(computed >= 2, || {
                    format!("agent {} computed {} paths for a moving target", sim.agent.entity(), computed)
                })
            })
            .and_then(|_| all_caught(&world));
        Ok((world, verdict))
    }

    /// CHASE-005: Retarget - nearest targetable candidate.
    ///
    /// A non-targetable decoy stands closest. Halfway through, the chosen
    /// target is removed and the agents must switch to the remaining one.
    async fn run_retarget(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-005: Retarget - dynamic target selection");

        let mut settings = self.settings.clone();
        settings.config.dynamic_retarget = true;
        let mut world = SimWorld::new(self.config(settings), TerrainWorld::plain(200.0));

        let decoy = world.oracle.spawn_entity(Self::standing(0.0, 5.0), Vector3::zeros(), true);
        let near = world.oracle.spawn_entity(Self::standing(0.0, 12.0), Vector3::zeros(), false);
        let far = world.oracle.spawn_entity(Self::standing(0.0, 30.0), Vector3::zeros(), false);
        world.spawn_agents(Self::standing(0.0, 0.0))?;

        let half = world.target_ticks() / 2;
        let mut export = export;
        self.simulate_ticks(&mut world, half, export.as_deref_mut()).await;

        let targets = |world: &SimWorld| -> Vec<Option<EntityId>> {
            world
                .agents
                .iter()
                .map(|sim| sim.agent.target().ok().flatten().and_then(|t| t.entity()))
                .collect()
        };
        let first = targets(&world);

        world.oracle.remove_entity(near);
        if let Some(export) = export.as_deref_mut() {
            let mut frame = world.frame();
            frame.events.push(SimEvent {
                message: format!("target {near} removed"),
                agent: None,
            });
            export.add_frame(frame);
        }

        let rest = world.target_ticks().saturating_sub(half);
        self.simulate_ticks(&mut world, rest, export).await;
        let second = targets(&world);

        let verdict = check(first.iter().all(|t| *t == Some(near)), || {
            format!("expected every agent on {near} (decoy {decoy}), got {first:?}")
        })
        .and_then(|_| {
            check(second.iter().all(|t| *t == Some(far)), || {
                format!("expected every agent on {far} after removal, got {second:?}")
            })
        })
        .and_then(|_| all_caught(&world));
        Ok((world, verdict))
    }

    /// CHASE-006: Blocked - blockage notifications.
    ///
    /// Direct chase is switched off so the agents walk their paths. Once an
    /// agent's cursor reaches waypoint 3, a blockage behind it and one ahead
    /// of it are reported.
    ///
    /// **Assertion**: the blockage behind changes nothing, the one ahead
    /// triggers exactly one recomputation, and the agents still arrive.
    async fn run_blocked(&self, export: Option<&mut SimExport>) -> Result<(SimWorld, Verdict), SimError> {
        info!("CHASE-006: Blocked - blockage policy");

        let mut settings = self.settings.clone();
        settings.config = ChaseConfig {
            check_direct_move: false,
            ..settings.config
        };
        let mut world = SimWorld::new(self.config(settings), TerrainWorld::plain(200.0));
        let target = world.oracle.spawn_entity(Self::standing(0.0, 40.0), Vector3::zeros(), false);
        world.spawn_agents(Self::standing(0.0, 0.0))?;
        world.set_target_all(Target::Entity(target))?;

        let mut export = export;
        let mut fired = vec![false; world.agent_count()];
        let mut verdict: Verdict = Ok(());

        for _ in 0..world.target_ticks() {
            self.simulate_ticks(&mut world, 1, export.as_deref_mut()).await;

            for (index, sim) in world.agents.iter().enumerate() {
                let cursor = sim.agent.cursor().unwrap_or(0);
                let walking = sim.agent.status() == Ok(PathStatus::Pathfinding);
                if fired[index] || !walking || cursor < 3 {
                    continue;
                }
                fired[index] = true;

                let before = sim.paths.calls();
                sim.paths.fire_blocked(cursor - 1);
                settle().await;
                let after_behind = sim.paths.calls();

                sim.paths.fire_blocked(cursor + 1);
                settle().await;
                let after_ahead = sim.paths.calls();

                debug!(agent = %sim.agent.entity(), cursor, before, after_behind, after_ahead, "blockages fired");
                if verdict.is_ok() {
                    verdict = check(after_behind == before, || {
                        format!("blockage behind cursor {cursor} recomputed ({before} -> {after_behind})")
                    })
                    .and_then(|_| {
                        check(after_ahead == before + 1, || {
                            format!("blockage ahead of cursor {cursor} gave {before} -> {after_ahead} computations")
                        })
                    });
                }
            }
        }

        let verdict = verdict
            .and_then(|_| check(fired.iter().all(|f| *f), || "some agents never reached waypoint 3".to_string()))
            .and_then(|_| all_caught(&world));
        Ok((world, verdict))
    }
}
