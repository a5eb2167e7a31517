//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the chase targets:
//! - True positions of all target entities
//! - Constant-velocity kinematics
//! - Seeded jitter for scenario variation
//!
//! It is the `TargetRoster` every simulated agent reads from.

use nalgebra::Vector3;
use pursuit_env::{Candidate, EntityId, TargetRoster};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A ground truth entity in the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthEntity {
    /// Entity ID
    pub id: EntityId,

    /// Position [x, y, z] (Y up)
    pub position: Vector3<f64>,

    /// Velocity [vx, vy, vz] in units per second
    pub velocity: Vector3<f64>,

    /// Excluded from automatic target selection
    pub non_targetable: bool,

    /// Entity is active (not removed)
    pub active: bool,
}

impl GroundTruthEntity {
    /// Creates a stationary, targetable entity.
    pub fn new(id: EntityId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            velocity: Vector3::zeros(),
            non_targetable: false,
            active: true,
        }
    }
}

struct OracleState {
    rng: ChaCha8Rng,
    entities: BTreeMap<u64, GroundTruthEntity>,
    next_id: u64,
    current_time: f64,
}

/// The Oracle - maintains ground truth for every chase target.
///
/// Shared between the harness (which steps it) and the agents (which read
/// it through [`TargetRoster`]).
pub struct Oracle {
    /// Seed of the physics stream
    physics_seed: u64,

    state: Mutex<OracleState>,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            state: Mutex::new(OracleState {
                rng: ChaCha8Rng::seed_from_u64(physics_seed),
                entities: BTreeMap::new(),
                next_id: 0,
                current_time: 0.0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed this oracle was created with.
    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    /// Spawns a new entity and returns its ID.
    pub fn spawn_entity(&self, position: Vector3<f64>, velocity: Vector3<f64>, non_targetable: bool) -> EntityId {
        let mut state = self.lock();
        let key = state.next_id;
        state.next_id += 1;

        let id = EntityId::from_seed(self.physics_seed.wrapping_add(key));
        let entity = GroundTruthEntity {
            velocity,
            non_targetable,
            ..GroundTruthEntity::new(id, position)
        };
        state.entities.insert(key, entity);
        id
    }

    /// Spawns an entity at `position` displaced by up to `spread` in X and Z.
    pub fn spawn_jittered(&self, position: Vector3<f64>, velocity: Vector3<f64>, spread: f64) -> EntityId {
        let offset = {
            let mut state = self.lock();
            if spread > 0.0 {
                Vector3::new(
                    state.rng.gen_range(-spread..=spread),
                    0.0,
                    state.rng.gen_range(-spread..=spread),
                )
            } else {
                Vector3::zeros()
            }
        };
        self.spawn_entity(position + offset, velocity, false)
    }

    /// Removes an entity from the simulation.
    pub fn remove_entity(&self, id: EntityId) {
        if let Some(entity) = self.lock().entities.values_mut().find(|e| e.id == id) {
            entity.active = false;
        }
    }

    /// Sets an entity's velocity.
    pub fn set_velocity(&self, id: EntityId, velocity: Vector3<f64>) {
        if let Some(entity) = self.lock().entities.values_mut().find(|e| e.id == id) {
            entity.velocity = velocity;
        }
    }

    /// Teleports an entity.
    pub fn set_position(&self, id: EntityId, position: Vector3<f64>) {
        if let Some(entity) = self.lock().entities.values_mut().find(|e| e.id == id) {
            entity.position = position;
        }
    }

    /// Advances physics by dt seconds.
    pub fn step(&self, dt: f64) {
        let mut state = self.lock();
        state.current_time += dt;

        // Simple constant-velocity model
        for entity in state.entities.values_mut() {
            if entity.active {
                entity.position += entity.velocity * dt;
            }
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.lock().current_time
    }

    /// Returns all active entities.
    pub fn active_entities(&self) -> Vec<GroundTruthEntity> {
        self.lock().entities.values().filter(|e| e.active).cloned().collect()
    }

    /// Returns a specific entity by ID.
    pub fn entity(&self, id: EntityId) -> Option<GroundTruthEntity> {
        self.lock().entities.values().find(|e| e.id == id).cloned()
    }

    /// Returns ground truth positions of active entities.
    pub fn ground_truth_positions(&self) -> Vec<(EntityId, Vector3<f64>)> {
        self.lock()
            .entities
            .values()
            .filter(|e| e.active)
            .map(|e| (e.id, e.position))
            .collect()
    }
}

impl TargetRoster for Oracle {
    fn candidates(&self) -> Vec<Candidate> {
        self.lock()
            .entities
            .values()
            .filter(|e| e.active)
            .map(|e| Candidate {
                entity: e.id,
                position: e.position,
                non_targetable: e.non_targetable,
            })
            .collect()
    }
}
