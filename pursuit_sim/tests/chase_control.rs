//! Controller behaviour against scripted collaborators on the virtual clock.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use pursuit_core::{AgentEvent, AgentSettings, ChaseAgent, ChaseConfig, ChaseError, Oracles, PathStatus, PursuitEvent, Target};
use pursuit_env::{EntityId, PathError};
use pursuit_sim::{settle, LinePathOracle, MoverCommand, Oracle, ScriptedMover, SimBody, SimContext, TerrainWorld, ROOT_HEIGHT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const STEP: Duration = Duration::from_millis(50);

fn at(z: f64) -> Vector3<f64> {
    Vector3::new(0.0, ROOT_HEIGHT, z)
}

struct Rig {
    ctx: Arc<SimContext>,
    roster: Arc<Oracle>,
    paths: Arc<LinePathOracle>,
    mover: Arc<ScriptedMover>,
    agent: ChaseAgent<SimContext>,
    events: broadcast::Receiver<AgentEvent>,
    log: Vec<PursuitEvent>,
}

impl Rig {
    fn new(terrain: TerrainWorld, start: Vector3<f64>, config: ChaseConfig) -> Self {
        let ctx = SimContext::shared(7);
        let roster = Arc::new(Oracle::new(7));
        let paths = Arc::new(LinePathOracle::new(10.0));
        let mover = Arc::new(ScriptedMover::new(start));
        let body = SimBody::new(EntityId::from_seed(100), mover.clone());

        let oracles = Oracles {
            geometry: Arc::new(terrain),
            paths: paths.clone(),
            roster: roster.clone(),
        };
        let agent = ChaseAgent::create(ctx.clone(), &body, oracles, Some(AgentSettings::with_config(config)))
            .expect("valid body");
        let events = agent.subscribe().expect("alive");

        Self {
            ctx,
            roster,
            paths,
            mover,
            agent,
            events,
            log: Vec::new(),
        }
    }

    fn plain(config: ChaseConfig) -> Self {
        Self::new(TerrainWorld::plain(200.0), at(0.0), config)
    }

    /// Starts the loop with a point target and lets the first cycle run.
    async fn chasing(mut self, target: Vector3<f64>) -> Self {
        self.agent.set_target(Some(Target::Point(target))).expect("alive");
        assert_eq!(self.agent.start(), Ok(true));
        self.settle().await;
        self
    }

    async fn settle(&mut self) {
        settle().await;
        while let Ok(event) = self.events.try_recv() {
            self.log.push(event.event);
        }
    }

    async fn run_for(&mut self, secs: f64) {
        let steps = (secs / STEP.as_secs_f64()).round() as usize;
        for _ in 0..steps {
            self.ctx.advance_time(STEP);
            self.settle().await;
        }
    }

    fn computed(&self) -> usize {
        self.log.iter().filter(|e| matches!(e, PursuitEvent::PathComputed(_))).count()
    }

    fn statuses(&self) -> Vec<PathStatus> {
        self.log
            .iter()
            .filter_map(|e| match e {
                PursuitEvent::PathStatusChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Goal of the latest movement command.
    fn goal(&self) -> Vector3<f64> {
        match self.mover.last_command() {
            Some(MoverCommand::MoveTo { point, .. }) => point,
            other => panic!("expected a move command, got {other:?}"),
        }
    }

    fn moves(&self) -> usize {
        self.mover
            .commands()
            .iter()
            .filter(|c| matches!(c, MoverCommand::MoveTo { .. }))
            .count()
    }
}

#[tokio::test]
async fn test_unchecked_far_target_chased_directly() {
    let mut rig = Rig::plain(ChaseConfig::permissive()).chasing(at(100.0)).await;

    assert_eq!(rig.agent.status(), Ok(PathStatus::Following));
    assert_eq!(rig.paths.calls(), 0);
    assert_eq!(rig.mover.last_command(), Some(MoverCommand::MoveTo { point: at(100.0), target: None }));

    rig.run_for(1.0).await;
    assert_eq!(rig.statuses(), vec![PathStatus::Following]);
    assert_eq!(rig.computed(), 0);
    assert!(rig.moves() > 1, "direct move re-issued every tick");
}

#[tokio::test]
async fn test_target_beyond_radius_computes_one_path() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;

    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
    assert_eq!(rig.agent.cursor(), Ok(1));
    assert_relative_eq!(rig.goal().z, 10.0, epsilon = 1e-9);
    assert_eq!(rig.agent.current_path().expect("alive").map(|p| p.len()), Some(4));
    assert_eq!(rig.agent.has_path_subscriptions(), Ok((true, true)));

    rig.run_for(1.0).await;
    assert_eq!(rig.computed(), 1);
    assert_eq!(rig.paths.calls(), 1);
    assert_eq!(rig.statuses(), vec![PathStatus::Pathfinding]);
}

#[tokio::test]
async fn test_blockage_behind_cursor_ignored_ahead_recomputes() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;

    assert!(rig.mover.finish(true));
    rig.settle().await;
    assert_eq!(rig.agent.cursor(), Ok(2));
    assert_relative_eq!(rig.goal().z, 20.0, epsilon = 1e-9);

    assert!(rig.paths.fire_blocked(1));
    rig.settle().await;
    assert_eq!(rig.paths.calls(), 1);
    assert_eq!(rig.agent.cursor(), Ok(2));

    assert!(rig.paths.fire_blocked(3));
    rig.settle().await;
    assert_eq!(rig.paths.calls(), 2);
    assert_eq!(rig.computed(), 2);
    assert_eq!(rig.agent.cursor(), Ok(1));
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
}

#[tokio::test]
async fn test_final_waypoint_completes_without_movement() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;

    for expected_cursor in [2, 3] {
        assert!(rig.mover.finish(true));
        rig.settle().await;
        assert_eq!(rig.agent.cursor(), Ok(expected_cursor));
    }
    let moves = rig.moves();

    assert!(rig.mover.finish(true));
    rig.settle().await;
    assert_eq!(rig.agent.cursor(), Ok(3));
    assert_eq!(rig.moves(), moves);
    assert_eq!(rig.agent.has_path_subscriptions(), Ok((false, false)));

    let reached = rig.log.iter().filter(|e| matches!(e, PursuitEvent::WaypointReached(_))).count();
    assert_eq!(reached, 2);

    rig.run_for(1.0).await;
    assert_eq!(rig.moves(), moves);
    assert_eq!(rig.paths.calls(), 1);
}

#[tokio::test]
async fn test_gave_up_move_recomputes() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;

    assert!(rig.mover.finish(false));
    rig.settle().await;

    assert_eq!(rig.paths.calls(), 2);
    assert_eq!(rig.agent.cursor(), Ok(1));
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
}

#[tokio::test]
async fn test_disable_mid_path_stops_in_place() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;
    assert!(rig.mover.has_pending());

    rig.agent.set_enabled(false).expect("alive");
    rig.settle().await;

    assert_eq!(rig.agent.status(), Ok(PathStatus::Idle));
    assert_eq!(rig.agent.has_path_subscriptions(), Ok((false, false)));
    assert_eq!(rig.agent.current_path(), Ok(None));
    assert_eq!(rig.mover.last_command(), Some(MoverCommand::Stop));
    assert!(rig.log.contains(&PursuitEvent::Stopped));
    assert_eq!(rig.statuses().last(), Some(&PathStatus::Idle));

    rig.mover.set_speed(0.0);
    let commands = rig.mover.commands().len();
    rig.run_for(1.0).await;
    assert_eq!(rig.mover.commands().len(), commands);
    assert_eq!(rig.paths.calls(), 1);

    rig.mover.set_speed(16.0);
    rig.agent.set_enabled(true).expect("alive");
    rig.run_for(0.2).await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
    assert_eq!(rig.paths.calls(), 2);
}

#[tokio::test]
async fn test_clearing_target_stops_in_place() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;

    rig.agent.set_target(None).expect("alive");
    rig.settle().await;

    assert_eq!(rig.agent.status(), Ok(PathStatus::Idle));
    assert_eq!(rig.agent.target(), Ok(None));
    assert_eq!(rig.mover.last_command(), Some(MoverCommand::Stop));
    assert!(!rig.mover.finish(true), "pending move dropped by the stop");
}

/// Chases toward a chasm until the drop probe looks over the edge.
async fn edge_rig() -> Rig {
    let mut rig = Rig::new(TerrainWorld::chasm(200.0, 5.0, 9.0), at(-4.0), ChaseConfig::default())
        .chasing(at(12.0))
        .await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Following));
    assert_eq!(rig.snapshot_drop_safe(), Some(true));

    rig.mover.set_position(at(0.0));
    rig.run_for(0.2).await;
    rig
}

impl Rig {
    fn snapshot_drop_safe(&self) -> Option<bool> {
        self.agent.snapshot().expect("alive").map(|s| s.drop_safe)
    }
}

#[tokio::test]
async fn test_edge_ahead_forces_path() {
    let mut rig = edge_rig().await;

    assert_eq!(rig.statuses(), vec![PathStatus::Following, PathStatus::Pathfinding]);
    assert_eq!(rig.computed(), 1);
    assert!(!rig.agent.live_config().expect("alive").check_direct_move);
    assert!(rig.agent.default_config().check_direct_move);

    rig.run_for(1.0).await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding), "override keeps following the path");
    assert_eq!(rig.paths.calls(), 1);

    rig.agent.set_target(Some(Target::Point(at(12.0)))).expect("alive");
    assert!(rig.agent.live_config().expect("alive").check_direct_move);
}

#[tokio::test]
async fn test_fall_restores_default_and_recomputes() {
    let mut rig = edge_rig().await;
    assert_eq!(rig.agent.cursor(), Ok(1));

    rig.mover.set_position(Vector3::new(0.0, ROOT_HEIGHT - 10.0, 6.0));
    assert!(rig.mover.finish(true));
    rig.settle().await;

    assert!(rig.agent.live_config().expect("alive").check_direct_move);
    assert_eq!(rig.paths.calls(), 2);
    assert_eq!(rig.computed(), 2);
    assert_eq!(rig.agent.cursor(), Ok(1));
    assert!(
        !rig.log.iter().any(|e| matches!(e, PursuitEvent::WaypointReached(_))),
        "a fall is not an arrival"
    );
}

#[tokio::test]
async fn test_stuck_agent_jumps_and_recomputes() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;
    assert_eq!(rig.mover.jumps(), 0);

    rig.mover.set_speed(0.0);
    rig.run_for(1.0).await;

    assert!(rig.mover.jumps() >= 1);
    assert!(rig.paths.calls() >= 2);
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
}

#[tokio::test]
async fn test_single_slow_sample_does_not_jump() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;
    rig.run_for(0.2).await;

    // The cycle at 0.4s samples a stalled agent; it recovers before the
    // confirming sample one tick later.
    rig.mover.set_speed(0.0);
    rig.run_for(0.4).await;
    assert_eq!(rig.mover.jumps(), 0);

    rig.mover.set_speed(16.0);
    rig.run_for(1.2).await;
    assert_eq!(rig.mover.jumps(), 0);
    assert_eq!(rig.paths.calls(), 1);
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
}

#[tokio::test]
async fn test_slow_agent_on_drifted_path_does_not_jump() {
    let mut rig = Rig::plain(ChaseConfig::default());
    let prey = rig.roster.spawn_entity(at(30.0), Vector3::zeros(), false);
    rig.agent.set_target(Some(Target::Entity(prey))).expect("alive");
    rig.agent.start().expect("alive");
    rig.settle().await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));

    // Path end is 5 units off: past the stuck gate, inside the recompute radius.
    rig.roster.set_position(prey, at(35.0));
    rig.mover.set_speed(0.0);
    rig.run_for(2.0).await;

    assert_eq!(rig.mover.jumps(), 0);
    assert_eq!(rig.paths.calls(), 1);
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
}

#[tokio::test]
async fn test_stuck_recovery_jumps_once_and_restores_direct_move() {
    let mut rig = edge_rig().await;
    assert!(!rig.agent.live_config().expect("alive").check_direct_move);
    assert_eq!(rig.paths.calls(), 1);

    rig.mover.set_speed(0.0);
    for _ in 0..20 {
        rig.run_for(STEP.as_secs_f64()).await;
        if rig.mover.jumps() > 0 {
            break;
        }
    }

    assert_eq!(rig.mover.jumps(), 1);
    assert_eq!(rig.paths.calls(), 2);
    assert_eq!(rig.computed(), 2);
    assert!(rig.agent.live_config().expect("alive").check_direct_move);
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
    assert_eq!(rig.agent.cursor(), Ok(1));

    let commands = rig.mover.commands();
    assert!(matches!(commands[commands.len() - 2], MoverCommand::Jump), "jump precedes the new path");
    assert!(matches!(commands[commands.len() - 1], MoverCommand::MoveTo { .. }));
}

#[tokio::test]
async fn test_path_failure_leaves_agent_idle_and_retries() {
    let mut rig = Rig::plain(ChaseConfig::default());
    rig.paths.fail_with(Some(PathError::NoPath));
    rig.mover.set_speed(0.0);
    let mut rig = rig.chasing(at(30.0)).await;

    rig.run_for(0.5).await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Idle));
    assert!(rig.paths.calls() >= 2, "retried on the next stale check");
    assert_eq!(rig.computed(), 0);
    assert_eq!(rig.mover.jumps(), 0, "no stuck detection while idle");

    rig.mover.set_speed(16.0);
    rig.paths.fail_with(None);
    rig.run_for(0.5).await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Pathfinding));
    assert_eq!(rig.computed(), 1);
}

#[tokio::test]
async fn test_retarget_picks_nearest_targetable() {
    let rig = Rig::plain(ChaseConfig::default());
    let still = Vector3::zeros();
    rig.roster.spawn_entity(at(3.0), still, true);
    let near = rig.roster.spawn_entity(at(10.0), still, false);
    let far = rig.roster.spawn_entity(at(20.0), still, false);

    assert_eq!(rig.agent.retarget_now(), Ok(Some(near)));
    assert_eq!(rig.agent.target(), Ok(Some(Target::Entity(near))));
    assert_eq!(rig.agent.retarget_now(), Ok(None));

    rig.roster.remove_entity(near);
    assert_eq!(rig.agent.retarget_now(), Ok(Some(far)));
}

#[tokio::test]
async fn test_dynamic_retarget_chases_entity() {
    let config = ChaseConfig {
        dynamic_retarget: true,
        ..ChaseConfig::default()
    };
    let mut rig = Rig::plain(config);
    let prey = rig.roster.spawn_entity(at(10.0), Vector3::zeros(), false);

    assert_eq!(rig.agent.start(), Ok(true));
    rig.settle().await;

    assert_eq!(rig.agent.target(), Ok(Some(Target::Entity(prey))));
    assert_eq!(rig.agent.status(), Ok(PathStatus::Following));
    assert_eq!(rig.mover.last_command(), Some(MoverCommand::MoveTo { point: at(10.0), target: Some(prey) }));
}

#[tokio::test]
async fn test_vanished_target_idles_without_clearing() {
    let mut rig = Rig::plain(ChaseConfig::default());
    let prey = rig.roster.spawn_entity(at(10.0), Vector3::zeros(), false);
    rig.agent.set_target(Some(Target::Entity(prey))).expect("alive");
    rig.agent.start().expect("alive");
    rig.settle().await;
    assert_eq!(rig.agent.status(), Ok(PathStatus::Following));

    rig.roster.remove_entity(prey);
    rig.run_for(0.2).await;
    let moves = rig.moves();
    rig.run_for(1.0).await;

    assert_eq!(rig.moves(), moves);
    assert_eq!(rig.agent.target(), Ok(Some(Target::Entity(prey))));
    assert_eq!(rig.agent.status(), Ok(PathStatus::Following), "last mode stays reported");
}

#[tokio::test]
async fn test_destroy_mid_path_releases_everything() {
    let mut rig = Rig::plain(ChaseConfig::default()).chasing(at(30.0)).await;
    let id = rig.agent.entity();

    rig.agent.destroy().await.expect("first destroy");
    rig.settle().await;

    assert!(!rig.agent.is_running());
    assert_eq!(rig.mover.last_command(), Some(MoverCommand::Stop));
    assert_eq!(rig.agent.status(), Err(ChaseError::Destroyed(id)));

    let commands = rig.mover.commands().len();
    assert!(!rig.paths.fire_blocked(3), "blockage watcher is gone");
    rig.run_for(1.0).await;
    assert_eq!(rig.mover.commands().len(), commands);
    assert_eq!(rig.paths.calls(), 1);
}

#[test]
fn test_inert_body_is_rejected() {
    let oracles = Oracles {
        geometry: Arc::new(TerrainWorld::plain(10.0)),
        paths: Arc::new(LinePathOracle::new(10.0)),
        roster: Arc::new(Oracle::new(1)),
    };
    let body = SimBody::inert(EntityId::from_seed(3));

    let err = ChaseAgent::create(SimContext::shared(1), &body, oracles, None).err();
    assert_eq!(err, Some(ChaseError::MissingRoot(EntityId::from_seed(3))));
}

#[test]
fn test_negative_tick_is_rejected_at_creation() {
    let oracles = Oracles {
        geometry: Arc::new(TerrainWorld::plain(10.0)),
        paths: Arc::new(LinePathOracle::new(10.0)),
        roster: Arc::new(Oracle::new(1)),
    };
    let body = SimBody::new(EntityId::from_seed(4), Arc::new(ScriptedMover::new(at(0.0))));
    let mut settings = AgentSettings::default();
    settings.tuning.base_tick = -0.5;
    settings.tuning.idle_tick = -0.5;

    let err = ChaseAgent::create(SimContext::shared(1), &body, oracles, Some(settings)).err();
    assert!(matches!(err, Some(ChaseError::InvalidTuning(_))), "got {err:?}");
}
