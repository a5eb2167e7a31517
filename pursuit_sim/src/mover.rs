//! Simulated bodies and movement executors.

use nalgebra::Vector3;
use pursuit_env::{Body, EntityId, MoveCompletion, MovementExecutor};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::terrain::{TerrainWorld, ROOT_HEIGHT};

/// Default movement speed of simulated agents (units per second).
pub const DEFAULT_MAX_SPEED: f64 = 16.0;

/// Distance at which a goal counts as reached.
pub const ARRIVAL_RADIUS: f64 = 0.5;

/// Downward acceleration (units per second squared).
pub const GRAVITY: f64 = 40.0;

/// Vertical speed given by a jump.
pub const JUMP_SPEED: f64 = 14.0;

/// Agents falling below this height are caught (the void has no floor).
pub const KILL_PLANE: f64 = -200.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A movement command as seen by the executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoverCommand {
    /// Walk toward a point
    MoveTo {
        /// Goal
        point: Vector3<f64>,
        /// Body being homed on, if any
        target: Option<EntityId>,
    },

    /// Jump
    Jump,

    /// Stop in place
    Stop,
}

struct Kinematics {
    position: Vector3<f64>,
    vertical_speed: f64,
    grounded: bool,
    goal: Option<Vector3<f64>>,
    pending: Option<oneshot::Sender<bool>>,
    speed: f64,
    commands: u64,
}

/// Walks toward its goal at max speed on every [`step`](Self::step).
///
/// Horizontal motion ignores walls; vertically the body stands on the
/// highest ground under it or falls.
pub struct KinematicMover {
    max_speed: f64,
    terrain: Arc<TerrainWorld>,
    state: Mutex<Kinematics>,
}

impl KinematicMover {
    /// Creates a mover standing at `position`.
    pub fn new(position: Vector3<f64>, max_speed: f64, terrain: Arc<TerrainWorld>) -> Self {
        Self {
            max_speed,
            terrain,
            state: Mutex::new(Kinematics {
                position,
                vertical_speed: 0.0,
                grounded: true,
                goal: None,
                pending: None,
                speed: 0.0,
                commands: 0,
            }),
        }
    }

    /// Number of movement commands received so far.
    pub fn command_count(&self) -> u64 {
        lock(&self.state).commands
    }

    /// Current goal, if moving.
    pub fn goal(&self) -> Option<Vector3<f64>> {
        lock(&self.state).goal
    }

    /// Integrates `dt` seconds of motion.
    pub fn step(&self, dt: f64) {
        let mut state = lock(&self.state);
        let start = state.position;

        if let Some(goal) = state.goal {
            let mut flat = goal - state.position;
            flat.y = 0.0;
            let remaining = flat.norm();
            let reach = self.max_speed * dt;

            if remaining <= reach.max(ARRIVAL_RADIUS) {
                state.position.x = goal.x;
                state.position.z = goal.z;
                state.goal = None;
                if let Some(done) = state.pending.take() {
                    let _ = done.send(true);
                }
            } else {
                state.position += flat / remaining * reach;
            }
        }

        let surface = self.terrain.surface_below(&(state.position - Vector3::new(0.0, ROOT_HEIGHT, 0.0)));
        let stand = surface.map(|y| y + ROOT_HEIGHT);

        state.vertical_speed -= GRAVITY * dt;
        let next_y = state.position.y + state.vertical_speed * dt;
        match stand {
            Some(floor) if next_y <= floor => {
                state.position.y = floor;
                state.vertical_speed = 0.0;
                state.grounded = true;
            }
            _ => {
                state.position.y = next_y.max(KILL_PLANE);
                state.grounded = false;
            }
        }

        let mut moved = state.position - start;
        moved.y = 0.0;
        state.speed = if dt > 0.0 { moved.norm() / dt } else { 0.0 };
    }
}

impl MovementExecutor for KinematicMover {
    fn move_to(&self, point: Vector3<f64>, _target: Option<EntityId>) -> MoveCompletion {
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.state);
        state.goal = Some(point);
        state.pending = Some(tx);
        state.commands += 1;
        rx
    }

    fn jump(&self) {
        let mut state = lock(&self.state);
        if state.grounded {
            state.vertical_speed = JUMP_SPEED;
            state.grounded = false;
        }
    }

    fn position(&self) -> Vector3<f64> {
        lock(&self.state).position
    }

    fn speed(&self) -> f64 {
        lock(&self.state).speed
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        state.goal = None;
        state.pending = None;
        state.speed = 0.0;
    }
}

struct Script {
    position: Vector3<f64>,
    speed: f64,
    commands: Vec<MoverCommand>,
    pending: Option<oneshot::Sender<bool>>,
}

/// A mover that only records what it is told.
///
/// Position and speed are set by the test; completion of the pending move
/// is signalled with [`finish`](Self::finish).
pub struct ScriptedMover {
    max_speed: f64,
    script: Mutex<Script>,
}

impl ScriptedMover {
    /// Creates a mover at `position` moving at full speed.
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            max_speed: DEFAULT_MAX_SPEED,
            script: Mutex::new(Script {
                position,
                speed: DEFAULT_MAX_SPEED,
                commands: Vec::new(),
                pending: None,
            }),
        }
    }

    /// Moves the body.
    pub fn set_position(&self, position: Vector3<f64>) {
        lock(&self.script).position = position;
    }

    /// Sets the reported speed.
    pub fn set_speed(&self, speed: f64) {
        lock(&self.script).speed = speed;
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<MoverCommand> {
        lock(&self.script).commands.clone()
    }

    /// The most recent command.
    pub fn last_command(&self) -> Option<MoverCommand> {
        lock(&self.script).commands.last().copied()
    }

    /// Number of jumps commanded.
    pub fn jumps(&self) -> usize {
        lock(&self.script)
            .commands
            .iter()
            .filter(|c| matches!(c, MoverCommand::Jump))
            .count()
    }

    /// Completes the pending move. Returns false if none was pending.
    pub fn finish(&self, reached: bool) -> bool {
        match lock(&self.script).pending.take() {
            Some(done) => done.send(reached).is_ok(),
            None => false,
        }
    }

    /// True while a move awaits completion.
    pub fn has_pending(&self) -> bool {
        lock(&self.script).pending.as_ref().map_or(false, |tx| !tx.is_closed())
    }
}

impl MovementExecutor for ScriptedMover {
    fn move_to(&self, point: Vector3<f64>, target: Option<EntityId>) -> MoveCompletion {
        let (tx, rx) = oneshot::channel();
        let mut script = lock(&self.script);
        script.commands.push(MoverCommand::MoveTo { point, target });
        script.pending = Some(tx);
        rx
    }

    fn jump(&self) {
        lock(&self.script).commands.push(MoverCommand::Jump);
    }

    fn position(&self) -> Vector3<f64> {
        lock(&self.script).position
    }

    fn speed(&self) -> f64 {
        lock(&self.script).speed
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn stop(&self) {
        let mut script = lock(&self.script);
        script.commands.push(MoverCommand::Stop);
        script.pending = None;
    }
}

/// A simulated host entity: an id plus a movement executor.
pub struct SimBody {
    entity: EntityId,
    motion: Option<Arc<dyn MovementExecutor>>,
}

impl SimBody {
    /// Creates a body driven by `motion`.
    pub fn new(entity: EntityId, motion: Arc<dyn MovementExecutor>) -> Self {
        Self {
            entity,
            motion: Some(motion),
        }
    }

    /// A body without a motion controller (cannot be put under chase control).
    pub fn inert(entity: EntityId) -> Self {
        Self { entity, motion: None }
    }
}

impl Body for SimBody {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn root_position(&self) -> Option<Vector3<f64>> {
        self.motion.as_ref().map(|m| m.position())
    }

    fn motion(&self) -> Option<Arc<dyn MovementExecutor>> {
        self.motion.clone()
    }
}
