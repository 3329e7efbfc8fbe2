//! Injected timing primitive.
//!
//! Wall-clock mechanics stay outside the bookkeeping core: everything that
//! measures a duration asks a [`Clock`] for the current reading.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Monotonic reading relative to an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for deterministic timing in tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let step = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.micros.fetch_add(step, Ordering::SeqCst);
    }

    pub fn advance_micros(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Start point of one timed span.
#[derive(Debug, Clone, Copy)]
pub struct OpTimer {
    started: Duration,
}

impl OpTimer {
    pub fn start(clock: &dyn Clock) -> Self {
        Self { started: clock.now() }
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_sub(self.started)
    }
}
