//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::exporter::{AgentFrame, EntityPosition, SimFrame};
use crate::mover::{KinematicMover, SimBody, DEFAULT_MAX_SPEED};
use crate::oracle::Oracle;
use crate::pathing::LinePathOracle;
use crate::terrain::TerrainWorld;

use nalgebra::Vector3;
use pursuit_core::geometry::horizontal_distance;
use pursuit_core::{AgentEvent, AgentSettings, ChaseAgent, ChaseError, Oracles, PathStatus, PursuitEvent, Target};
use pursuit_env::{EntityId, MovementExecutor, PursuitContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

/// How many times [`settle`] yields to the scheduler.
pub const SETTLE_YIELDS: usize = 16;

/// Lets every task woken by the last clock advance run to its next suspension.
pub async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of agents to spawn
    pub num_agents: usize,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Maximum simulation duration in seconds
    pub max_duration_secs: f64,

    /// Waypoint spacing of the path oracle
    pub path_spacing: f64,

    /// Settings every agent is created with
    pub settings: AgentSettings,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 1,
            tick_rate_hz: 30,
            max_duration_secs: 20.0,
            path_spacing: 4.5,
            settings: AgentSettings::default(),
        }
    }
}

/// Handle to a simulated agent.
pub struct SimAgent {
    /// The controller under test
    pub agent: ChaseAgent<SimContext>,

    /// Its body
    pub mover: Arc<KinematicMover>,

    /// Its private path oracle (fault injection is per agent)
    pub paths: Arc<LinePathOracle>,

    /// Every event received so far
    pub log: Vec<PursuitEvent>,

    events: broadcast::Receiver<AgentEvent>,
}

impl SimAgent {
    /// Moves pending events into the log.
    pub fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.log.push(event.event),
                Err(TryRecvError::Lagged(missed)) => {
                    debug!(agent = %self.agent.entity(), missed, "event log lagged");
                }
                Err(_) => break,
            }
        }
    }

    /// Number of logged events matching `pred`.
    pub fn count(&self, pred: impl Fn(&PursuitEvent) -> bool) -> usize {
        self.log.iter().filter(|e| pred(e)).count()
    }

    /// Position of the current target, if it resolves.
    pub fn target_position(&self, oracle: &Oracle) -> Option<Vector3<f64>> {
        self.agent.target().ok().flatten()?.resolve(oracle)
    }

    /// Horizontal distance to the current target, if it resolves.
    pub fn distance_to_target(&self, oracle: &Oracle) -> Option<f64> {
        let target = self.target_position(oracle)?;
        Some(horizontal_distance(&self.mover.position(), &target))
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Static geometry
    pub terrain: Arc<TerrainWorld>,

    /// Ground truth of the targets
    pub oracle: Arc<Oracle>,

    /// Agents in spawn order
    pub agents: Vec<SimAgent>,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld over `terrain`.
    pub fn new(config: SimConfig, terrain: TerrainWorld) -> Self {
        // Derive separate seeds for different subsystems
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        Self {
            context: SimContext::shared(config.seed),
            terrain: Arc::new(terrain),
            oracle: Arc::new(Oracle::new(physics_seed)),
            agents: Vec::new(),
            tick_count: 0,
            config,
        }
    }

    /// Spawns and starts an agent standing at `position`.
    pub fn spawn_agent(&mut self, position: Vector3<f64>) -> Result<EntityId, ChaseError> {
        let entity = EntityId::from_seed(self.config.seed.wrapping_add(1_000 + self.agents.len() as u64));
        let mover = Arc::new(KinematicMover::new(position, DEFAULT_MAX_SPEED, Arc::clone(&self.terrain)));
        let paths = Arc::new(LinePathOracle::new(self.config.path_spacing).with_terrain(Arc::clone(&self.terrain)));

        let oracles = Oracles {
            geometry: self.terrain.clone(),
            paths: paths.clone(),
            roster: self.oracle.clone(),
        };
        let body = SimBody::new(entity, mover.clone());
        let mut settings = self.config.settings.clone();
        settings.name = format!("{}-{}", settings.name, self.agents.len());

        let agent = ChaseAgent::create(Arc::clone(&self.context), &body, oracles, Some(settings))?;
        let events = agent.subscribe()?;
        agent.start()?;

        self.agents.push(SimAgent {
            agent,
            mover,
            paths,
            log: Vec::new(),
            events,
        });
        Ok(entity)
    }

    /// Spawns `num_agents` agents in a row along X, two units apart.
    pub fn spawn_agents(&mut self, origin: Vector3<f64>) -> Result<Vec<EntityId>, ChaseError> {
        (0..self.config.num_agents)
            .map(|i| self.spawn_agent(origin + Vector3::new(i as f64 * 2.0, 0.0, 0.0)))
            .collect()
    }

    /// Assigns the same target to every agent.
    pub fn set_target_all(&self, target: Target) -> Result<(), ChaseError> {
        self.agents.iter().try_for_each(|a| a.agent.set_target(Some(target)))
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / f64::from(self.config.tick_rate_hz.max(1))
    }

    /// Number of ticks covering the configured duration.
    pub fn target_ticks(&self) -> u64 {
        (self.config.max_duration_secs * f64::from(self.config.tick_rate_hz)) as u64
    }

    /// Advances simulation by one tick and lets the agents react.
    pub async fn tick(&mut self) {
        let dt = self.dt();

        self.oracle.step(dt);
        for sim in &self.agents {
            sim.mover.step(dt);
        }
        self.context.advance_time(Duration::from_secs_f64(dt));

        settle().await;
        for sim in &mut self.agents {
            sim.drain_events();
        }
        self.tick_count += 1;
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns the number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Snapshot of the world for export.
    pub fn frame(&self) -> SimFrame {
        let targets = self
            .oracle
            .ground_truth_positions()
            .into_iter()
            .map(|(id, pos)| EntityPosition::new(id, pos))
            .collect();

        let agents = self
            .agents
            .iter()
            .map(|sim| {
                let target = sim.agent.target().ok().flatten();
                AgentFrame {
                    agent_id: sim.agent.entity().to_string(),
                    position: EntityPosition::new(sim.agent.entity(), sim.mover.position()),
                    status: sim.agent.status().unwrap_or(PathStatus::Idle),
                    target: target.and_then(|t| t.entity()).map(|e| e.to_string()),
                    cursor: sim.agent.current_path().ok().flatten().and(sim.agent.cursor().ok()),
                    distance_to_target: sim.distance_to_target(&self.oracle),
                }
            })
            .collect();

        SimFrame {
            time_sec: self.time(),
            targets,
            agents,
            events: Vec::new(),
        }
    }

    /// Destroys every agent.
    pub async fn shutdown(&mut self) -> Result<(), ChaseError> {
        for sim in &self.agents {
            sim.agent.destroy().await?;
        }
        settle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::ROOT_HEIGHT;

    #[test]
    fn test_sim_world_time() {
        let world = SimWorld::new(SimConfig::default(), TerrainWorld::plain(10.0));
        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.time(), 0.0);
        assert_eq!(world.target_ticks(), 600);
    }

    #[tokio::test]
    async fn test_spawned_agents_start_idle() {
        let config = SimConfig { num_agents: 3, ..SimConfig::default() };
        let mut world = SimWorld::new(config, TerrainWorld::plain(50.0));

        let ids = world.spawn_agents(Vector3::new(0.0, ROOT_HEIGHT, 0.0)).expect("valid bodies");
        assert_eq!(ids.len(), 3);
        assert_eq!(world.agent_count(), 3);

        world.tick().await;
        assert_eq!(world.tick_count(), 1);
        assert!((world.time() - 1.0 / 30.0).abs() < 1e-9);
        for sim in &world.agents {
            assert!(sim.agent.is_running());
            assert_eq!(sim.agent.status(), Ok(PathStatus::Idle));
        }

        world.shutdown().await.expect("alive");
    }
}
