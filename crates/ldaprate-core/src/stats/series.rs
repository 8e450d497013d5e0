//! Interval bookkeeping shared by every tracker.

use tracing::warn;

/// Accumulators for consecutive, fixed-width collection intervals.
///
/// The current interval covers `[end - width, end)`. An update that arrives
/// at or after `end` closes the current interval and pads every interval
/// that saw no activity with `T::default()`.
#[derive(Debug, Clone)]
pub(crate) struct IntervalSeries<T> {
    width_millis: i64,
    current_end_millis: i64,
    current: T,
    completed: Vec<T>,
}

impl<T: Default> IntervalSeries<T> {
    pub(crate) fn new(width_millis: i64, start_millis: i64) -> Self {
        let width_millis = width_millis.max(1);
        Self {
            width_millis,
            current_end_millis: start_millis.saturating_add(width_millis),
            current: T::default(),
            completed: Vec::new(),
        }
    }

    /// Returns the accumulator for the interval containing `now_millis`.
    pub(crate) fn at(&mut self, now_millis: i64) -> &mut T {
        self.roll_to(now_millis);
        &mut self.current
    }

    /// Closes every interval that ended at or before `now_millis`.
    ///
    /// Returns the end of the last complete interval. Activity in the
    /// still-open interval is not part of the series.
    pub(crate) fn close(&mut self, now_millis: i64) -> i64 {
        self.roll_to(now_millis);
        self.current_end_millis - self.width_millis
    }

    pub(crate) fn completed(&self) -> &[T] {
        &self.completed
    }

    fn roll_to(&mut self, now_millis: i64) {
        if now_millis < self.current_end_millis {
            return;
        }
        self.completed.push(std::mem::take(&mut self.current));
        self.current_end_millis += self.width_millis;
        while self.current_end_millis <= now_millis {
            self.completed.push(T::default());
            self.current_end_millis += self.width_millis;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Start/stop bookkeeping with the warnings trackers emit on misuse.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    phase: Phase,
    started_at_millis: Option<i64>,
    stopped_at_millis: Option<i64>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            started_at_millis: None,
            stopped_at_millis: None,
        }
    }

    pub(crate) fn start(&mut self, name: &str, now_millis: i64) {
        if self.phase != Phase::Idle {
            warn!(tracker = name, "multiple calls to start stat tracker");
        }
        self.phase = Phase::Running;
        self.started_at_millis = Some(now_millis);
        self.stopped_at_millis = None;
    }

    /// Returns `false` when the tracker was never started.
    pub(crate) fn stop(&mut self, name: &str) -> bool {
        if self.phase == Phase::Idle {
            warn!(tracker = name, "attempted to stop stat tracker without starting it");
            return false;
        }
        self.phase = Phase::Stopped;
        true
    }

    pub(crate) fn record_stop(&mut self, stopped_at_millis: i64) {
        self.stopped_at_millis = Some(stopped_at_millis);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub(crate) fn started_at(&self) -> Option<i64> {
        self.started_at_millis
    }

    pub(crate) fn stopped_at(&self) -> Option<i64> {
        self.stopped_at_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_within_one_interval_accumulate() {
        let mut series: IntervalSeries<u64> = IntervalSeries::new(1_000, 0);
        *series.at(0) += 1;
        *series.at(999) += 1;

        assert!(series.completed().is_empty());
        assert_eq!(*series.at(999), 2);
    }

    #[test]
    fn test_boundary_opens_next_interval() {
        let mut series: IntervalSeries<u64> = IntervalSeries::new(1_000, 0);
        *series.at(10) += 3;
        *series.at(1_000) += 1;

        assert_eq!(series.completed(), &[3]);
    }

    #[test]
    fn test_idle_intervals_are_padded() {
        let mut series: IntervalSeries<u64> = IntervalSeries::new(1_000, 0);
        *series.at(10) += 1;
        *series.at(3_500) += 1;

        assert_eq!(series.completed(), &[1, 0, 0]);
    }

    #[test]
    fn test_close_drops_partial_interval() {
        let mut series: IntervalSeries<u64> = IntervalSeries::new(1_000, 0);
        *series.at(10) += 1;
        *series.at(1_200) += 5;

        assert_eq!(series.close(1_900), 1_000);
        assert_eq!(series.completed(), &[1]);

        assert_eq!(series.close(2_000), 2_000);
        assert_eq!(series.completed(), &[1, 5]);
    }

    #[test]
    fn test_lifecycle_stop_without_start() {
        let mut lifecycle = Lifecycle::new();
        assert!(!lifecycle.stop("t"));
        assert!(!lifecycle.is_running());

        lifecycle.start("t", 5);
        assert!(lifecycle.is_running());
        assert!(lifecycle.stop("t"));
        assert!(!lifecycle.is_running());
        assert_eq!(lifecycle.started_at(), Some(5));
    }
}
