//! Time sources.
//!
//! Two notions of time are used throughout a run:
//!
//! - **Wall-clock milliseconds** drive the statistics window and the
//!   collection-interval boundaries of every tracker.
//! - **High-resolution nanoseconds** time individual operations. Only the
//!   difference between two readings is meaningful.
//!
//! Monotonicity of the wall clock is not enforced. A clock that steps
//! backwards can delay a warm-up transition but can never reopen a closed
//! statistics window (see [`crate::window`]).

use chrono::Utc;
use once_cell::sync::Lazy;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of wall-clock and high-resolution time.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> i64;

    /// Nanoseconds from an arbitrary fixed origin.
    fn nanos(&self) -> i64;
}

/// Clock handle shared between trackers, controllers and limiters.
pub type SharedClock = Arc<dyn Clock>;

static ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Returns a shared handle to the system clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn nanos(&self) -> i64 {
        i64::try_from(ORIGIN.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
///
/// `advance` moves both readings forward together. `set_epoch_millis` moves
/// only the wall clock, which is how tests simulate a clock stepping
/// backwards.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    nanos: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start_epoch_millis`.
    #[must_use]
    pub fn new(start_epoch_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_epoch_millis),
            nanos: AtomicI64::new(0),
        }
    }

    /// Creates a shared clock reading `start_epoch_millis`.
    #[must_use]
    pub fn shared(start_epoch_millis: i64) -> Arc<Self> {
        Arc::new(Self::new(start_epoch_millis))
    }

    /// Moves both readings forward.
    pub fn advance(&self, by: Duration) {
        let nanos = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
        // Keep the wall clock in step with the nanosecond reading so that
        // sub-millisecond advances accumulate.
        let total = self.nanos.load(Ordering::SeqCst);
        let previous = (total - nanos) / 1_000_000;
        self.millis
            .fetch_add(total / 1_000_000 - previous, Ordering::SeqCst);
    }

    /// Sets the wall-clock reading without touching the nanosecond reading.
    pub fn set_epoch_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
