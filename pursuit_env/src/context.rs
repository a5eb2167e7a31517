//! Core environment context trait for Pursuit agents.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The central interface for time and task scheduling.
///
/// This trait abstracts the host's clock and task runner so that the chase
/// controller can run in both production (tokio) and simulation (virtual
/// clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `tokio::spawn`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
#[async_trait]
pub trait PursuitContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// This is the only suspension point of the control loop besides
    /// path computation, so cancellation is checked around it.
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task and returns its handle.
    ///
    /// The handle is used to abort subscriptions and to join the
    /// control loop on teardown.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
