//! Operation pacing.
//!
//! Workers poll a [`RateLimiter`] at the top of every iteration. A limiter
//! never blocks for long: when the next slot is not due yet it naps for at
//! most `max_wait` and tells the caller to re-poll, so a stop request is
//! noticed promptly even at very low rates.

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::Duration;

/// Default upper bound on a single nap inside [`FixedRateBarrier::await_slot`].
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(50);

/// A pacing gate shared by the workers of a job.
pub trait RateLimiter: Send + Sync + Debug {
    /// Returns `true` when the caller should skip this iteration and poll
    /// again, `false` when it may issue its operation now.
    fn await_slot(&self) -> bool;
}

/// A limiter that never holds anyone back.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn await_slot(&self) -> bool {
        false
    }
}

/// Allows at most `per_interval` operations per `interval`, spread evenly.
///
/// Slots are spaced `interval / per_interval` apart. A caller that falls more
/// than one whole interval behind schedule does not get a burst of catch-up
/// slots; the schedule restarts from the current time.
#[derive(Debug)]
pub struct FixedRateBarrier {
    clock: SharedClock,
    spacing_nanos: i64,
    interval_nanos: i64,
    max_wait: Duration,
    next_slot_nanos: Mutex<Option<i64>>,
}

impl FixedRateBarrier {
    /// Creates a barrier allowing `per_interval` operations every `interval`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRate` if either value is zero.
    pub fn new(interval: Duration, per_interval: u32, clock: SharedClock) -> CoreResult<Self> {
        if per_interval == 0 {
            return Err(CoreError::InvalidRate(
                "operations per interval must be at least 1".to_string(),
            ));
        }
        let interval_nanos = i64::try_from(interval.as_nanos())
            .map_err(|_| CoreError::InvalidRate(format!("interval {interval:?} is too long")))?;
        if interval_nanos == 0 {
            return Err(CoreError::InvalidRate(
                "rate interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            clock,
            spacing_nanos: (interval_nanos / i64::from(per_interval)).max(1),
            interval_nanos,
            max_wait: DEFAULT_MAX_WAIT,
            next_slot_nanos: Mutex::new(None),
        })
    }

    /// Caps how long a single poll may sleep. Zero never sleeps.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Time between consecutive slots.
    #[must_use]
    pub fn spacing(&self) -> Duration {
        Duration::from_nanos(self.spacing_nanos as u64)
    }
}

impl RateLimiter for FixedRateBarrier {
    fn await_slot(&self) -> bool {
        let now = self.clock.nanos();
        let wait_nanos = {
            let mut next_slot = self.next_slot_nanos.lock();
            match *next_slot {
                Some(slot) if now < slot => slot - now,
                Some(slot) if now - slot <= self.interval_nanos => {
                    *next_slot = Some(slot + self.spacing_nanos);
                    return false;
                }
                _ => {
                    *next_slot = Some(now + self.spacing_nanos);
                    return false;
                }
            }
        };

        let nap = Duration::from_nanos(wait_nanos as u64).min(self.max_wait);
        if !nap.is_zero() {
            std::thread::sleep(nap);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn barrier(clock: &std::sync::Arc<ManualClock>, per_second: u32) -> FixedRateBarrier {
        FixedRateBarrier::new(Duration::from_secs(1), per_second, clock.clone())
            .unwrap()
            .with_max_wait(Duration::ZERO)
    }

    #[test]
    fn test_rejects_zero_rate() {
        let clock = ManualClock::shared(0);
        assert!(FixedRateBarrier::new(Duration::from_secs(1), 0, clock.clone()).is_err());
        assert!(FixedRateBarrier::new(Duration::ZERO, 10, clock).is_err());
    }

    #[test]
    fn test_slots_are_evenly_spaced() {
        let clock = ManualClock::shared(0);
        let limiter = barrier(&clock, 4);
        assert_eq!(limiter.spacing(), Duration::from_millis(250));

        assert!(!limiter.await_slot());
        assert!(limiter.await_slot());

        clock.advance(Duration::from_millis(249));
        assert!(limiter.await_slot());

        clock.advance(Duration::from_millis(1));
        assert!(!limiter.await_slot());
        assert!(limiter.await_slot());
    }

    #[test]
    fn test_bounded_rate_over_one_second() {
        let clock = ManualClock::shared(0);
        let limiter = barrier(&clock, 10);

        let mut issued = 0;
        for _ in 0..1_000 {
            if !limiter.await_slot() {
                issued += 1;
            }
            clock.advance(Duration::from_millis(1));
        }

        assert_eq!(issued, 10);
    }

    #[test]
    fn test_falling_far_behind_restarts_schedule() {
        let clock = ManualClock::shared(0);
        let limiter = barrier(&clock, 2);

        assert!(!limiter.await_slot());
        clock.advance(Duration::from_secs(5));
        assert!(!limiter.await_slot());
        assert!(limiter.await_slot());
    }

    #[test]
    fn test_unlimited_never_skips() {
        assert!(!Unlimited.await_slot());
    }
}
