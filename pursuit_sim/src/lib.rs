//! Pursuit Deterministic Simulation Harness
//!
//! This crate provides a controlled world in which chase agents run
//! deterministically against scripted terrain, targets and path oracles.
//!
//! # Core Principle: Virtual Time
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: A virtual clock that only advances when the harness ticks
//! - **Scheduling**: A single-threaded runtime settled after every tick
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock) + current_thread runtime  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Agent  │              │  Agent  │     ...               │
//! │  │ + Mover │              │ + Mover │                       │
//! │  └─────────┘              └─────────┘                       │
//! │       ▲                        ▲                            │
//! │  ┌────┴────────────────────────┴────┐                       │
//! │  │  TerrainWorld  │  Oracle (targets)│                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pursuit_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 2).run(ScenarioId::Wall)?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod mover;
mod oracle;
mod pathing;
mod runner;
pub mod scenarios;
mod terrain;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{AgentFrame, EntityPosition, SimEvent, SimExport, SimFrame};
pub use mover::{KinematicMover, MoverCommand, ScriptedMover, SimBody};
pub use oracle::{GroundTruthEntity, Oracle};
pub use pathing::LinePathOracle;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use terrain::{BoxKind, TerrainBox, TerrainWorld, ROOT_HEIGHT};
pub use world::{settle, SimAgent, SimConfig, SimWorld};
