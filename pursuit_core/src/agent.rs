//! Agent Lifecycle - construction, mutable properties and teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ChaseAgent (handle)                                          │
//! │   set_target / set_enabled ──► hooks ──┐                     │
//! │   start ──► control loop task ─────────┤                     │
//! │   destroy ──► cancel + join            ▼                     │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ AgentCore                                              │  │
//! │  │   Mutex<AgentState>: target, enabled, live config,     │  │
//! │  │                      PathState, subscriptions          │  │
//! │  │   mover ─ geometry ─ paths ─ roster ─ events           │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │        ▲ movement completion / blocked (subscription tasks)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let agent = ChaseAgent::create(ctx, &body, oracles, None)?;
//! agent.set_target(Some(Target::Entity(player)))?;
//! agent.start()?;
//! // ...
//! agent.destroy().await?;
//! ```

use nalgebra::Vector3;
use pursuit_env::{
    Body, EntityId, GeometryOracle, MovementExecutor, Path, PathOracle, PursuitContext,
    RaycastFilter, TargetRoster,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

use crate::config::{AgentSettings, ChaseConfig, ChaseTuning};
use crate::error::ChaseError;
use crate::events::{AgentEvent, EventBus, PursuitEvent};
use crate::path_state::{PathState, PathStatus};
use crate::relation::RelationSnapshot;
use crate::target::Target;

/// The shared services an agent queries.
#[derive(Clone)]
pub struct Oracles {
    /// Raycasts for sight and drop checks
    pub geometry: Arc<dyn GeometryOracle>,

    /// Route planning
    pub paths: Arc<dyn PathOracle>,

    /// Candidate targets and entity positions
    pub roster: Arc<dyn TargetRoster>,
}

/// Outstanding background tasks of one agent.
///
/// Each slot holds at most one task; installing a new one aborts the old.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    movement: Option<AbortHandle>,
    blocked: Option<AbortHandle>,
    recompute: Option<AbortHandle>,
    move_ticket: u64,
}

impl Subscriptions {
    /// Reserves the ticket for the next movement subscription.
    pub(crate) fn next_move_ticket(&mut self) -> u64 {
        self.move_ticket += 1;
        self.move_ticket
    }

    pub(crate) fn move_ticket(&self) -> u64 {
        self.move_ticket
    }

    pub(crate) fn set_movement(&mut self, handle: AbortHandle) {
        if let Some(old) = self.movement.replace(handle) {
            old.abort();
        }
    }

    /// Forgets the movement subscription without aborting it (it is the caller).
    pub(crate) fn release_movement(&mut self) {
        self.movement = None;
    }

    pub(crate) fn set_blocked(&mut self, handle: AbortHandle) {
        if let Some(old) = self.blocked.replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn set_recompute(&mut self, handle: AbortHandle) {
        if let Some(old) = self.recompute.replace(handle) {
            old.abort();
        }
    }

    /// Drops movement-completion and blockage subscriptions.
    pub(crate) fn cancel_path(&mut self) {
        self.move_ticket += 1;
        for handle in [self.movement.take(), self.blocked.take()].into_iter().flatten() {
            handle.abort();
        }
    }

    /// Drops everything, including a pending recomputation.
    pub(crate) fn cancel_all(&mut self) {
        self.cancel_path();
        if let Some(handle) = self.recompute.take() {
            handle.abort();
        }
    }

    pub(crate) fn has_movement(&self) -> bool {
        self.movement.is_some()
    }

    pub(crate) fn has_blocked(&self) -> bool {
        self.blocked.is_some()
    }
}

/// Mutable per-agent record, guarded by the core's mutex.
#[derive(Debug)]
pub(crate) struct AgentState {
    pub(crate) enabled: bool,
    pub(crate) target: Option<Target>,
    /// Live copy of the configuration.
    ///
    /// Only `check_direct_move` is ever overridden. Restore points: leaving
    /// `Following` normally, falls, stuck recovery, path completion and
    /// target assignment.
    pub(crate) live: ChaseConfig,
    pub(crate) filter: RaycastFilter,
    pub(crate) path: PathState,
    pub(crate) snapshot: Option<RelationSnapshot>,
    pub(crate) subscriptions: Subscriptions,
    /// Bumped when a computation starts or the agent halts; a result whose
    /// ticket is no longer current is discarded.
    pub(crate) recompute_ticket: u64,
    pub(crate) destroyed: bool,
}

/// Shared agent internals, referenced by the handle and by every task.
pub(crate) struct AgentCore<Ctx: PursuitContext> {
    pub(crate) entity: EntityId,
    pub(crate) name: String,
    pub(crate) ctx: Arc<Ctx>,
    pub(crate) mover: Arc<dyn MovementExecutor>,
    pub(crate) oracles: Oracles,
    pub(crate) defaults: ChaseConfig,
    pub(crate) tuning: ChaseTuning,
    pub(crate) events: EventBus,
    pub(crate) state: Mutex<AgentState>,
    pub(crate) cancelled: AtomicBool,
}

impl<Ctx: PursuitContext> AgentCore<Ctx> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn exclusion_for(&self, target: Option<&Target>) -> RaycastFilter {
        RaycastFilter::excluding(std::iter::once(self.entity).chain(target.and_then(Target::entity)))
    }

    /// Hook run on every `target` assignment.
    pub(crate) fn on_target_changed(&self, target: Option<Target>) {
        {
            let mut state = self.lock();
            state.filter = self.exclusion_for(target.as_ref());
            state.live.restore_direct_move(&self.defaults);
            state.target = target;
        }
        match target {
            Some(t) => debug!(agent = %self.entity, target = ?t, "target changed"),
            None => self.halt("target cleared"),
        }
    }

    /// Hook run on every `enabled` assignment.
    pub(crate) fn on_enabled_changed(&self, enabled: bool) {
        self.lock().enabled = enabled;
        if enabled {
            debug!(agent = %self.entity, "enabled");
        } else {
            self.halt("disabled");
        }
    }

    /// Cancels path work, stops in place and returns to `Idle`.
    pub(crate) fn halt(&self, reason: &str) {
        let previous = {
            let mut state = self.lock();
            state.subscriptions.cancel_all();
            state.recompute_ticket += 1;
            state.path.reset()
        };
        self.mover.stop();
        self.events.emit(PursuitEvent::Stopped);
        if previous != PathStatus::Idle {
            info!(agent = %self.entity, from = %previous, reason, "halted");
            self.events.emit(PursuitEvent::PathStatusChanged(PathStatus::Idle));
        }
    }
}

/// Handle to a chase-controlled agent.
///
/// Every operation fails with [`ChaseError::Destroyed`] once
/// [`destroy`](ChaseAgent::destroy) has run.
pub struct ChaseAgent<Ctx: PursuitContext> {
    core: Arc<AgentCore<Ctx>>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl<Ctx: PursuitContext> ChaseAgent<Ctx> {
    /// Puts `body` under chase control.
    ///
    /// Fails if the body has no root reference point or no motion
    /// controller, or if the tuning constants do not validate. The agent
    /// starts `Idle`, enabled, without a target, and with its control loop
    /// not yet running (see [`start`](Self::start)).
    pub fn create(
        ctx: Arc<Ctx>,
        body: &dyn Body,
        oracles: Oracles,
        settings: Option<AgentSettings>,
    ) -> Result<Self, ChaseError> {
        let entity = body.entity();
        if body.root_position().is_none() {
            return Err(ChaseError::MissingRoot(entity));
        }
        let mover = body.motion().ok_or(ChaseError::MissingMotion(entity))?;
        let settings = settings.unwrap_or_default();
        settings.tuning.validate()?;
        body.release_physics_ownership();

        let state = AgentState {
            enabled: true,
            target: None,
            live: settings.config,
            filter: RaycastFilter::excluding([entity]),
            path: PathState::new(),
            snapshot: None,
            subscriptions: Subscriptions::default(),
            recompute_ticket: 0,
            destroyed: false,
        };

        info!(agent = %entity, name = %settings.name, seed = ctx.seed(), "chase agent created");

        let core = AgentCore {
            entity,
            name: settings.name,
            ctx,
            mover,
            oracles,
            defaults: settings.config,
            tuning: settings.tuning,
            events: EventBus::new(entity),
            state: Mutex::new(state),
            cancelled: AtomicBool::new(false),
        };

        Ok(Self {
            core: Arc::new(core),
            control: Mutex::new(None),
        })
    }

    fn ensure_alive(&self) -> Result<MutexGuard<'_, AgentState>, ChaseError> {
        let state = self.core.lock();
        if state.destroyed {
            return Err(ChaseError::Destroyed(self.core.entity));
        }
        Ok(state)
    }

    fn control(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Host entity under control.
    pub fn entity(&self) -> EntityId {
        self.core.entity
    }

    /// Logical name from the settings.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Starts the control loop. Returns `false` if it was already running.
    pub fn start(&self) -> Result<bool, ChaseError> {
        drop(self.ensure_alive()?);
        let mut control = self.control();
        if control.as_ref().map_or(false, |h| !h.is_finished()) {
            return Ok(false);
        }
        let core = Arc::clone(&self.core);
        *control = Some(self.core.ctx.spawn("pursuit-control", core.run()));
        Ok(true)
    }

    /// True while the control loop task is alive.
    pub fn is_running(&self) -> bool {
        self.control().as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Assigns (or clears) the target.
    ///
    /// Rebuilds the raycast exclusions and restores the direct-move check;
    /// clearing stops the agent in place.
    pub fn set_target(&self, target: Option<Target>) -> Result<(), ChaseError> {
        drop(self.ensure_alive()?);
        self.core.on_target_changed(target);
        Ok(())
    }

    /// Enables or disables the agent. Disabling stops it in place.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), ChaseError> {
        drop(self.ensure_alive()?);
        self.core.on_enabled_changed(enabled);
        Ok(())
    }

    /// Current target.
    pub fn target(&self) -> Result<Option<Target>, ChaseError> {
        Ok(self.ensure_alive()?.target)
    }

    /// Whether the agent is enabled.
    pub fn enabled(&self) -> Result<bool, ChaseError> {
        Ok(self.ensure_alive()?.enabled)
    }

    /// Current movement mode.
    ///
    /// While an entity target cannot be resolved the agent issues no
    /// commands but keeps reporting the mode it was last in; it resumes
    /// from there once the target resolves again.
    pub fn status(&self) -> Result<PathStatus, ChaseError> {
        Ok(self.ensure_alive()?.path.status())
    }

    /// Index of the waypoint currently headed for.
    pub fn cursor(&self) -> Result<usize, ChaseError> {
        Ok(self.ensure_alive()?.path.cursor())
    }

    /// The path being followed, if any.
    pub fn current_path(&self) -> Result<Option<Path>, ChaseError> {
        Ok(self.ensure_alive()?.path.path().cloned())
    }

    /// Live configuration, including temporary overrides.
    pub fn live_config(&self) -> Result<ChaseConfig, ChaseError> {
        Ok(self.ensure_alive()?.live)
    }

    /// Configuration captured at creation.
    pub fn default_config(&self) -> ChaseConfig {
        self.core.defaults
    }

    /// Tuning constants.
    pub fn tuning(&self) -> &ChaseTuning {
        &self.core.tuning
    }

    /// The most recent relation snapshot.
    pub fn snapshot(&self) -> Result<Option<RelationSnapshot>, ChaseError> {
        Ok(self.ensure_alive()?.snapshot)
    }

    /// Receiver for this agent's events.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<AgentEvent>, ChaseError> {
        drop(self.ensure_alive()?);
        Ok(self.core.events.subscribe())
    }

    /// Whether movement and blockage subscriptions are outstanding.
    pub fn has_path_subscriptions(&self) -> Result<(bool, bool), ChaseError> {
        let state = self.ensure_alive()?;
        Ok((state.subscriptions.has_movement(), state.subscriptions.has_blocked()))
    }

    /// Position of the agent's root as reported by the mover.
    pub fn position(&self) -> Result<Vector3<f64>, ChaseError> {
        drop(self.ensure_alive()?);
        Ok(self.core.mover.position())
    }

    /// Recomputes the path now (or switches to direct chase if viable).
    pub async fn recompute(&self) -> Result<(), ChaseError> {
        drop(self.ensure_alive()?);
        self.core.recompute().await;
        Ok(())
    }

    /// Runs one dynamic-retarget scan regardless of the config flag.
    ///
    /// Returns the new target entity if the target changed.
    pub fn retarget_now(&self) -> Result<Option<EntityId>, ChaseError> {
        drop(self.ensure_alive()?);
        Ok(self.core.retarget())
    }

    /// Tears the agent down.
    ///
    /// Disables it, clears the target, cancels the control loop and every
    /// subscription, and waits for the control task to finish.
    pub async fn destroy(&self) -> Result<(), ChaseError> {
        {
            let mut state = self.ensure_alive()?;
            state.destroyed = true;
            state.enabled = false;
        }
        self.core.cancelled.store(true, Ordering::Release);
        self.core.on_target_changed(None);
        self.core.lock().subscriptions.cancel_all();

        let handle = self.control().take();
        if let Some(handle) = handle {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    debug!(agent = %self.core.entity, error = %e, "control task ended abnormally");
                }
            }
        }

        info!(agent = %self.core.entity, "chase agent destroyed");
        Ok(())
    }
}
