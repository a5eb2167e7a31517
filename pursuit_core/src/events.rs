//! Observable events emitted by chase agents.

use pursuit_env::{EntityId, Path, Waypoint};
use tokio::sync::broadcast;

use crate::path_state::PathStatus;

/// Default capacity of an agent's event channel.
pub const EVENT_CAPACITY: usize = 64;

/// Something a consumer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum PursuitEvent {
    /// Movement mode changed
    PathStatusChanged(PathStatus),

    /// A new path was adopted
    PathComputed(Path),

    /// An intermediate waypoint was reached
    WaypointReached(Waypoint),

    /// An in-place stop was commanded
    Stopped,
}

/// An event tagged with the agent that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEvent {
    /// Emitting agent
    pub agent: EntityId,

    /// What happened
    pub event: PursuitEvent,
}

/// Fan-out sender for agent events.
///
/// Sending with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    agent: EntityId,
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// Creates a bus for `agent`.
    pub fn new(agent: EntityId) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { agent, tx }
    }

    /// Publishes an event.
    pub fn emit(&self, event: PursuitEvent) {
        let _ = self.tx.send(AgentEvent { agent: self.agent, event });
    }

    /// New receiver observing events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}
