//! Simulation context implementing PursuitContext for deterministic testing.

use async_trait::async_trait;
use pursuit_env::PursuitContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Simulation context backed by a virtual clock.
///
/// This implements `PursuitContext` using:
/// - A virtual clock that only moves when the harness advances it
/// - `sleep` that parks the task until the clock reaches the deadline
/// - Seeded ChaCha8 streams for deterministic scenario jitter
///
/// The clock is published through a `watch` channel so that every sleeping
/// task is woken on each advance and re-checks its own deadline.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time since simulation start
    clock: Arc<watch::Sender<Duration>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        let (clock, _) = watch::channel(Duration::ZERO);
        Self {
            seed,
            clock: Arc::new(clock),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.clock.send_modify(|now| *now += duration);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.clock.send_replace(Duration::from_nanos(time_ns));
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        u64::try_from(self.now().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Deterministic RNG for one subsystem, derived from the master seed.
    pub fn rng(&self, stream: u64) -> ChaCha8Rng {
        let seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(seed)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            clock: Arc::clone(&self.clock),
        }
    }
}

#[async_trait]
impl PursuitContext for SimContext {
    fn now(&self) -> Duration {
        *self.clock.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        let mut clock = self.clock.subscribe();
        loop {
            let reached = *clock.borrow_and_update() >= deadline;
            if reached {
                return;
            }
            if clock.changed().await.is_err() {
                return;
            }
        }
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim-task", name = %name);
        tokio::spawn(future.instrument(span))
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
        assert_eq!(ctx.time_ns(), 1_500_000_000);

        ctx.set_time(250);
        assert_eq!(ctx.time_ns(), 250);
    }

    #[test]
    fn test_sim_context_deterministic_rng() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let a: u64 = ctx1.rng(1).gen();
        let b: u64 = ctx2.rng(1).gen();
        assert_eq!(a, b);

        let c: u64 = ctx1.rng(2).gen();
        assert_ne!(a, c);
    }

    #[test]
    fn test_sim_context_seed() {
        let ctx = SimContext::new(12345);
        assert_eq!(ctx.seed(), 12345);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[tokio::test]
    async fn test_sleep_waits_for_virtual_time() {
        let ctx = SimContext::shared(7);
        let woke = Arc::new(AtomicBool::new(false));

        let sleeper = {
            let clock = Arc::clone(&ctx);
            let woke = Arc::clone(&woke);
            ctx.spawn("sleeper", async move {
                clock.sleep(Duration::from_secs(2)).await;
                woke.store(true, Ordering::SeqCst);
            })
        };

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        ctx.advance_time(Duration::from_secs(1));
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(!woke.load(Ordering::SeqCst));

        ctx.advance_time(Duration::from_secs(1));
        sleeper.await.expect("sleeper task");
        assert!(woke.load(Ordering::SeqCst));
    }
}
