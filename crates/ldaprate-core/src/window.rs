//! Statistics collection window.
//!
//! A worker generates load for its whole run but only records statistics
//! inside a window that excludes an optional warm-up at the start and an
//! optional cool-down before the job's stop time.
//!
//! # States
//!
//! - **WarmingUp:** load is generated, nothing is recorded
//! - **Collecting:** trackers are running
//! - **CooledDown:** terminal, trackers have been stopped for good
//!
//! `CooledDown` is a one-shot latch. A wall clock that later steps backwards
//! cannot reopen the window.

use crate::stats::StatTracker;
use std::time::Duration;
use tracing::debug;

/// Where a worker is within its statistics window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Waiting for the warm-up period to elapse.
    WarmingUp,
    /// Recording statistics.
    Collecting,
    /// Finished recording.
    CooledDown,
}

/// Warm-up and cool-down settings.
///
/// `None` and zero both mean the period is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowConfig {
    /// Time after the worker starts before statistics are recorded.
    pub warm_up: Option<Duration>,
    /// Time before the job's stop time when recording ends.
    pub cool_down: Option<Duration>,
}

impl WindowConfig {
    fn warm_up_millis(&self) -> i64 {
        positive_millis(self.warm_up)
    }

    fn cool_down_millis(&self) -> i64 {
        positive_millis(self.cool_down)
    }
}

fn positive_millis(duration: Option<Duration>) -> i64 {
    duration.map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Something whose trackers the window starts and stops together.
pub trait TrackerLifecycle {
    /// Starts every tracker.
    fn start_trackers(&mut self);

    /// Stops every tracker.
    fn stop_trackers(&mut self);
}

impl TrackerLifecycle for Vec<Box<dyn StatTracker>> {
    fn start_trackers(&mut self) {
        for tracker in self.iter_mut() {
            tracker.start();
        }
    }

    fn stop_trackers(&mut self) {
        for tracker in self.iter_mut() {
            tracker.stop();
        }
    }
}

/// The effect of one [`StatisticsWindowController::evaluate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    None,
    /// Trackers were started.
    Started,
    /// Trackers were stopped.
    Stopped,
    /// The window closed before it ever opened; trackers were never started.
    Skipped,
}

/// Decides, once per loop iteration, whether statistics are recorded.
#[derive(Debug, Clone)]
pub struct StatisticsWindowController {
    state: WindowState,
    start_collecting_at_millis: i64,
    stop_collecting_at_millis: Option<i64>,
}

impl StatisticsWindowController {
    /// Computes the window for a worker starting at `now_millis`.
    ///
    /// The cool-down only applies when the job has a known stop time. Without
    /// a warm-up the trackers are started before this returns.
    pub fn begin<L>(
        config: WindowConfig,
        job_stop_millis: Option<i64>,
        now_millis: i64,
        trackers: &mut L,
    ) -> Self
    where
        L: TrackerLifecycle + ?Sized,
    {
        let cool_down = config.cool_down_millis();
        let stop_collecting_at_millis = match job_stop_millis {
            Some(stop) if cool_down > 0 => Some(stop.saturating_sub(cool_down)),
            _ => None,
        };

        let warm_up = config.warm_up_millis();
        let (state, start_collecting_at_millis) = if warm_up > 0 {
            (WindowState::WarmingUp, now_millis.saturating_add(warm_up))
        } else {
            trackers.start_trackers();
            (WindowState::Collecting, now_millis)
        };

        debug!(
            ?state,
            start_collecting_at_millis,
            ?stop_collecting_at_millis,
            "statistics window computed"
        );

        Self {
            state,
            start_collecting_at_millis,
            stop_collecting_at_millis,
        }
    }

    /// Applies the transition due at `now_millis`, if any.
    pub fn evaluate<L>(&mut self, now_millis: i64, trackers: &mut L) -> Transition
    where
        L: TrackerLifecycle + ?Sized,
    {
        match self.state {
            WindowState::CooledDown => Transition::None,
            WindowState::Collecting => {
                if self.past_stop(now_millis) {
                    trackers.stop_trackers();
                    self.state = WindowState::CooledDown;
                    debug!(now_millis, "cool-down reached, statistics collection stopped");
                    Transition::Stopped
                } else {
                    Transition::None
                }
            }
            WindowState::WarmingUp => {
                if self.past_stop(now_millis) {
                    self.state = WindowState::CooledDown;
                    debug!(now_millis, "cool-down reached before warm-up ended");
                    Transition::Skipped
                } else if now_millis >= self.start_collecting_at_millis {
                    trackers.start_trackers();
                    self.state = WindowState::Collecting;
                    debug!(now_millis, "warm-up complete, statistics collection started");
                    Transition::Started
                } else {
                    Transition::None
                }
            }
        }
    }

    /// Stops the trackers if the window is still open.
    ///
    /// Returns `true` when trackers were stopped by this call.
    pub fn finish<L>(&mut self, trackers: &mut L) -> bool
    where
        L: TrackerLifecycle + ?Sized,
    {
        let was_collecting = self.state == WindowState::Collecting;
        if was_collecting {
            trackers.stop_trackers();
        }
        self.state = WindowState::CooledDown;
        was_collecting
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Whether statistics are currently recorded.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.state == WindowState::Collecting
    }

    /// When the warm-up ends.
    #[must_use]
    pub fn start_collecting_at_millis(&self) -> i64 {
        self.start_collecting_at_millis
    }

    /// When the cool-down begins, `None` if collection runs to the end.
    #[must_use]
    pub fn stop_collecting_at_millis(&self) -> Option<i64> {
        self.stop_collecting_at_millis
    }

    fn past_stop(&self, now_millis: i64) -> bool {
        self.stop_collecting_at_millis
            .is_some_and(|stop| now_millis >= stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Calls {
        starts: u32,
        stops: u32,
    }

    impl TrackerLifecycle for Calls {
        fn start_trackers(&mut self) {
            self.starts += 1;
        }

        fn stop_trackers(&mut self) {
            self.stops += 1;
        }
    }

    fn config(warm_up_ms: u64, cool_down_ms: u64) -> WindowConfig {
        WindowConfig {
            warm_up: Some(Duration::from_millis(warm_up_ms)),
            cool_down: Some(Duration::from_millis(cool_down_ms)),
        }
    }

    #[test]
    fn test_no_warm_up_starts_immediately() {
        let mut calls = Calls::default();
        let window = StatisticsWindowController::begin(WindowConfig::default(), None, 0, &mut calls);

        assert!(window.is_collecting());
        assert_eq!(calls.starts, 1);
    }

    #[test]
    fn test_zero_warm_up_is_disabled() {
        let mut calls = Calls::default();
        let window = StatisticsWindowController::begin(config(0, 0), Some(10_000), 0, &mut calls);

        assert!(window.is_collecting());
        assert_eq!(window.stop_collecting_at_millis(), None);
    }

    #[test]
    fn test_warm_up_delays_collection() {
        let mut calls = Calls::default();
        let mut window = StatisticsWindowController::begin(config(100, 0), None, 1_000, &mut calls);

        assert_eq!(window.state(), WindowState::WarmingUp);
        assert_eq!(window.evaluate(1_099, &mut calls), Transition::None);
        assert_eq!(calls.starts, 0);
        assert_eq!(window.evaluate(1_100, &mut calls), Transition::Started);
        assert_eq!(window.evaluate(1_101, &mut calls), Transition::None);
        assert_eq!(calls.starts, 1);
    }

    #[test]
    fn test_cool_down_requires_stop_time() {
        let mut calls = Calls::default();
        let mut window = StatisticsWindowController::begin(config(0, 500), None, 0, &mut calls);

        assert_eq!(window.evaluate(i64::MAX, &mut calls), Transition::None);
        assert!(window.is_collecting());
    }

    #[test]
    fn test_cool_down_latch_survives_backwards_clock() {
        let mut calls = Calls::default();
        let mut window = StatisticsWindowController::begin(config(0, 500), Some(10_000), 0, &mut calls);

        assert_eq!(window.evaluate(9_499, &mut calls), Transition::None);
        assert_eq!(window.evaluate(9_500, &mut calls), Transition::Stopped);
        assert_eq!(window.evaluate(100, &mut calls), Transition::None);
        assert_eq!(window.state(), WindowState::CooledDown);
        assert_eq!((calls.starts, calls.stops), (1, 1));
    }

    #[test]
    fn test_inverted_window_never_starts_trackers() {
        let mut calls = Calls::default();
        // 600 ms of warm-up and 600 ms of cool-down in a 1 s run.
        let mut window = StatisticsWindowController::begin(config(600, 600), Some(1_000), 0, &mut calls);

        assert_eq!(window.evaluate(300, &mut calls), Transition::None);
        assert_eq!(window.evaluate(400, &mut calls), Transition::Skipped);
        assert_eq!(window.evaluate(700, &mut calls), Transition::None);
        assert_eq!((calls.starts, calls.stops), (0, 0));
        assert!(!window.finish(&mut calls));
    }

    #[test]
    fn test_finish_stops_open_window_once() {
        let mut calls = Calls::default();
        let mut window = StatisticsWindowController::begin(WindowConfig::default(), None, 0, &mut calls);

        assert!(window.finish(&mut calls));
        assert!(!window.finish(&mut calls));
        assert_eq!(calls.stops, 1);
    }
}
