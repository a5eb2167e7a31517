//! Error types for the simulation harness.

use pursuit_core::{ChaseError, SettingsError};
use thiserror::Error;

/// Errors raised while setting up or exporting a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Reading a settings file or writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A settings file or export could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A settings file could not be loaded
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// An agent could not be put under chase control
    #[error("agent error: {0}")]
    Chase(#[from] ChaseError),

    /// No scenario with that name
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// The command line asked for something the harness cannot do
    #[error("invalid usage: {0}")]
    Usage(String),
}
