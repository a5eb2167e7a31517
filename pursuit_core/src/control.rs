//! Control Loop - the per-agent tick driver.
//!
//! One cycle:
//!
//! 1. optional dynamic retarget
//! 2. idle sleep without a target or while disabled
//! 3. polling interval from target distance
//! 4. recompute a stale (or missing) path unless chasing directly
//! 5. direct chase while the relation checks allow it
//! 6. stuck detection (two slow speed samples one tick apart)
//! 7. sleep
//!
//! Movement-completion and blockage notifications arrive on their own
//! tasks and may schedule a recomputation while the loop sleeps. Every
//! computation takes a ticket; only the newest ticket may adopt its result.

use nalgebra::Vector3;
use pursuit_env::{ComputedPath, EntityId, PursuitContext, Waypoint};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::{AgentCore, AgentState};
use crate::events::PursuitEvent;
use crate::geometry::{squared_distance, tick_interval};
use crate::path_state::{ArrivalOutcome, PathStatus};
use crate::relation::{self, RelationSnapshot};
use crate::target::Target;

/// Agent and target positions for one decision.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pursuit {
    pub(crate) agent: Vector3<f64>,
    pub(crate) target: Vector3<f64>,
    pub(crate) body: Option<EntityId>,
}

impl Pursuit {
    fn distance(&self) -> f64 {
        (self.target - self.agent).norm()
    }
}

impl<Ctx: PursuitContext> AgentCore<Ctx> {
    /// Runs until cancelled.
    pub(crate) async fn run(self: Arc<Self>) {
        info!(agent = %self.entity, "control loop started");
        while !self.is_cancelled() {
            let pause = self.cycle().await;
            if self.is_cancelled() {
                break;
            }
            self.ctx.sleep(pause).await;
        }
        info!(agent = %self.entity, "control loop stopped");
    }

    /// One control cycle; returns how long to sleep afterwards.
    pub(crate) async fn cycle(self: &Arc<Self>) -> Duration {
        let idle = Duration::from_secs_f64(self.tuning.idle_tick);

        let retarget = self.lock().live.dynamic_retarget;
        if retarget {
            self.retarget();
        }

        let Some(pursuit) = self.pursuit() else {
            return idle;
        };
        let tick = tick_interval(pursuit.distance(), &self.tuning);

        let (status, staleness) = {
            let state = self.lock();
            (state.path.status(), state.path.staleness(&pursuit.target))
        };
        let stale = staleness.map_or(true, |d| d > self.tuning.recompute_radius.powi(2));
        if stale && status != PathStatus::Following {
            debug!(agent = %self.entity, ?staleness, "path stale");
            self.recompute().await;
        }
        if self.is_cancelled() {
            return tick;
        }

        self.chase().await;
        if self.is_cancelled() {
            return tick;
        }

        self.check_stuck(tick).await;
        tick
    }

    /// Agent and target positions, or `None` when there is nothing to do.
    pub(crate) fn pursuit(&self) -> Option<Pursuit> {
        let target = {
            let state = self.lock();
            if !state.enabled || state.destroyed {
                return None;
            }
            state.target?
        };
        let position = target.resolve(self.oracles.roster.as_ref())?;
        Some(Pursuit {
            agent: self.mover.position(),
            target: position,
            body: target.entity(),
        })
    }

    /// Evaluates relations with the live config and records the snapshot.
    fn assess(&self, pursuit: &Pursuit) -> (Option<RelationSnapshot>, bool) {
        let mut state = self.lock();
        let snapshot = relation::evaluate(
            &pursuit.agent,
            &pursuit.target,
            self.oracles.geometry.as_ref(),
            &state.filter,
            &state.live,
            &self.tuning,
        );
        let viable = relation::direct_move_viable(snapshot.as_ref(), &state.live, &self.tuning);
        state.snapshot = snapshot;
        (snapshot, viable)
    }

    /// Switches the nearest targetable candidate in as target.
    ///
    /// Returns the new target entity when it changed.
    pub(crate) fn retarget(&self) -> Option<EntityId> {
        let here = self.mover.position();
        let nearest = self
            .oracles
            .roster
            .candidates()
            .into_iter()
            .filter(|c| !c.non_targetable && c.entity != self.entity)
            .min_by(|a, b| {
                squared_distance(&a.position, &here).total_cmp(&squared_distance(&b.position, &here))
            })?;

        let current = self.lock().target;
        let candidate = Target::Entity(nearest.entity);
        if current == Some(candidate) {
            return None;
        }
        info!(agent = %self.entity, target = %nearest.entity, "retargeted to nearest candidate");
        self.on_target_changed(Some(candidate));
        Some(nearest.entity)
    }

    /// Direct chase: move straight at the target each tick while viable.
    ///
    /// On exit from `Following` the direct-move switch is restored, except
    /// when an edge lies ahead: then it is forced off so the new path is
    /// followed instead of walking off the edge.
    async fn chase(self: &Arc<Self>) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let Some(pursuit) = self.pursuit() else {
                return;
            };
            let (snapshot, viable) = self.assess(&pursuit);

            if !viable {
                let left = {
                    let mut state = self.lock();
                    if state.path.status() != PathStatus::Following {
                        false
                    } else {
                        let edge = state.live.check_drop && snapshot.map_or(false, |s| !s.drop_safe);
                        if edge {
                            state.live.check_direct_move = false;
                        } else {
                            state.live.restore_direct_move(&self.defaults);
                        }
                        state.path.leave_following();
                        info!(agent = %self.entity, edge, "direct chase ended");
                        true
                    }
                };
                if left {
                    self.events.emit(PursuitEvent::PathStatusChanged(PathStatus::Pathfinding));
                    self.recompute().await;
                }
                return;
            }

            self.enter_following();
            drop(self.mover.move_to(pursuit.target, pursuit.body));
            let pause = tick_interval(pursuit.distance(), &self.tuning);
            self.ctx.sleep(pause).await;
        }
    }

    /// Switches to `Following`, releasing path subscriptions.
    fn enter_following(&self) {
        let previous = {
            let mut state = self.lock();
            if state.path.status() == PathStatus::Following {
                return;
            }
            state.subscriptions.cancel_path();
            state.recompute_ticket += 1;
            state.path.enter_following()
        };
        info!(agent = %self.entity, from = %previous, "direct chase");
        self.events.emit(PursuitEvent::PathStatusChanged(PathStatus::Following));
    }

    /// Jump-and-recompute when the agent is slow twice in a row.
    async fn check_stuck(self: &Arc<Self>, tick: Duration) {
        let Some(pursuit) = self.pursuit() else {
            return;
        };
        let (status, staleness) = {
            let state = self.lock();
            (state.path.status(), state.path.staleness(&pursuit.target))
        };
        if status == PathStatus::Idle {
            return;
        }
        let settled = staleness.map_or(true, |d| d < self.tuning.stuck_staleness.powi(2));
        if !settled || !self.is_slow() {
            return;
        }

        self.ctx.sleep(tick).await;
        if self.is_cancelled() || !self.is_slow() || self.pursuit().is_none() {
            return;
        }

        info!(agent = %self.entity, speed = self.mover.speed(), "stuck, jumping");
        self.mover.jump();
        self.lock().live.restore_direct_move(&self.defaults);
        self.recompute().await;
    }

    fn is_slow(&self) -> bool {
        self.mover.speed() < self.tuning.stuck_speed_ratio * self.mover.max_speed()
    }

    /// Computes a new path, or enters `Following` if direct chase is viable.
    ///
    /// Failures leave the agent as it was; the next stale check retries.
    pub(crate) async fn recompute(self: &Arc<Self>) {
        let Some(pursuit) = self.pursuit() else {
            return;
        };
        let (_, viable) = self.assess(&pursuit);
        if viable {
            self.enter_following();
            return;
        }

        let ticket = {
            let mut state = self.lock();
            state.recompute_ticket += 1;
            state.recompute_ticket
        };
        debug!(agent = %self.entity, ticket, "computing path");

        let result = self.oracles.paths.compute(pursuit.agent, pursuit.target).await;
        if self.is_cancelled() {
            return;
        }
        match result {
            Ok(computed) => self.adopt(ticket, computed),
            Err(e) => warn!(agent = %self.entity, error = %e, "path computation failed"),
        }
    }

    /// Installs a freshly computed path and heads for its first waypoint.
    fn adopt(self: &Arc<Self>, ticket: u64, computed: ComputedPath) {
        let ComputedPath { path, mut blocked } = computed;
        let mut state = self.lock();
        if state.destroyed || !state.enabled || state.target.is_none() || ticket != state.recompute_ticket {
            debug!(agent = %self.entity, ticket, "discarding superseded path");
            return;
        }

        state.subscriptions.cancel_path();
        let previous = state.path.adopt(path.clone());
        let generation = state.path.generation();

        if previous != PathStatus::Pathfinding {
            self.events.emit(PursuitEvent::PathStatusChanged(PathStatus::Pathfinding));
        }
        info!(agent = %self.entity, waypoints = path.len(), generation, "path computed");
        self.events.emit(PursuitEvent::PathComputed(path));

        let core = Arc::clone(self);
        let watcher = self.ctx.spawn("pursuit-blocked", async move {
            while let Some(index) = blocked.recv().await {
                core.on_path_blocked(generation, index);
            }
        });
        state.subscriptions.set_blocked(watcher.abort_handle());

        if let Some(first) = state.path.current_waypoint().copied() {
            self.head_to(&mut state, &first);
        }
    }

    /// Commands movement toward `waypoint` and subscribes to its completion.
    fn head_to(self: &Arc<Self>, state: &mut AgentState, waypoint: &Waypoint) {
        if waypoint.requires_jump() {
            self.mover.jump();
        }
        let done = self.mover.move_to(waypoint.position, None);
        let ticket = state.subscriptions.next_move_ticket();
        let core = Arc::clone(self);
        let watcher = self.ctx.spawn("pursuit-move", async move {
            if let Ok(reached) = done.await {
                core.on_move_finished(ticket, reached);
            }
        });
        state.subscriptions.set_movement(watcher.abort_handle());
    }

    /// Runs a recomputation on its own task, replacing any pending one.
    fn schedule_recompute(self: &Arc<Self>, state: &mut AgentState) {
        let core = Arc::clone(self);
        let task = self.ctx.spawn("pursuit-recompute", async move {
            core.recompute().await;
        });
        state.subscriptions.set_recompute(task.abort_handle());
    }

    /// Movement-completion notification.
    pub(crate) fn on_move_finished(self: &Arc<Self>, ticket: u64, reached: bool) {
        let mut state = self.lock();
        if state.destroyed || ticket != state.subscriptions.move_ticket() {
            debug!(agent = %self.entity, ticket, "stale movement notification");
            return;
        }
        state.subscriptions.release_movement();

        if !reached {
            debug!(agent = %self.entity, "movement gave up before the waypoint");
            self.schedule_recompute(&mut state);
            return;
        }

        let position = self.mover.position();
        match state.path.arrive(&position, &self.tuning) {
            ArrivalOutcome::Stale => {
                debug!(agent = %self.entity, "arrival without an active path");
            }
            ArrivalOutcome::Fell { drop } => {
                info!(agent = %self.entity, drop, "fell off the path");
                state.live.restore_direct_move(&self.defaults);
                state.subscriptions.cancel_path();
                self.schedule_recompute(&mut state);
            }
            ArrivalOutcome::Advanced { reached, next } => {
                debug!(agent = %self.entity, cursor = state.path.cursor(), "waypoint reached");
                self.events.emit(PursuitEvent::WaypointReached(reached));
                self.head_to(&mut state, &next);
            }
            ArrivalOutcome::Complete { .. } => {
                info!(agent = %self.entity, "path complete");
                state.live.restore_direct_move(&self.defaults);
                state.subscriptions.cancel_path();
            }
        }
    }

    /// `Blocked(index)` notification for the path of `generation`.
    pub(crate) fn on_path_blocked(self: &Arc<Self>, generation: u64, index: usize) {
        let mut state = self.lock();
        if state.destroyed || generation != state.path.generation() {
            return;
        }
        if state.path.blockage_requires_recompute(index) {
            info!(agent = %self.entity, index, cursor = state.path.cursor(), "path blocked ahead");
            self.schedule_recompute(&mut state);
        } else {
            debug!(agent = %self.entity, index, cursor = state.path.cursor(), "ignoring blockage behind cursor");
        }
    }
}
