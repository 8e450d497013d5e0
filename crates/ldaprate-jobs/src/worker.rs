//! The generic rate-limited loop every worker thread runs.
//!
//! ```text
//! while !stop.should_stop():
//!     rate limiter says skip  -> re-poll
//!     reconnect counter hits N -> worker.reconnect()
//!     window.evaluate(now)     -> start/stop trackers
//!     worker.run_iteration(window.is_collecting())
//! window.finish(); worker.close()
//! ```

use crate::job::JobWorker;
use ldaprate_core::{
    RateLimiter, SharedClock, StatisticsWindowController, TrackerLifecycle, TrackerSnapshot,
    Transition, WindowConfig,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// How a worker thread, or a whole job, ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    CompletedWithErrors,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::CompletedWithErrors => f.write_str("completed with errors"),
        }
    }
}

/// Cooperative stop condition polled once per iteration.
///
/// Clones share the request flag.
#[derive(Debug, Clone)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
    stop_at_millis: Option<i64>,
    clock: SharedClock,
}

impl StopSignal {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            stop_at_millis: None,
            clock,
        }
    }

    /// Also stops once the clock reaches `stop_at_millis`.
    #[must_use]
    pub fn with_stop_at(mut self, stop_at_millis: Option<i64>) -> Self {
        self.stop_at_millis = stop_at_millis;
        self
    }

    /// Asks every worker sharing this signal to stop after its current
    /// iteration.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_requested()
            || self
                .stop_at_millis
                .is_some_and(|stop| self.clock.epoch_millis() >= stop)
    }

    #[must_use]
    pub fn stop_at_millis(&self) -> Option<i64> {
        self.stop_at_millis
    }
}

/// Loop settings shared by every worker of a job.
#[derive(Debug, Clone, Default)]
pub struct LoopSettings {
    pub window: WindowConfig,
    /// When the job is scheduled to stop, if it has a duration.
    pub job_stop_millis: Option<i64>,
    /// Reconnect after this many iterations; 0 never reconnects.
    pub operations_between_reconnects: u64,
}

/// What one worker thread did.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub thread_id: String,
    pub status: JobStatus,
    pub iterations: u64,
    pub reconnects: u64,
    pub error: Option<String>,
    pub snapshots: Vec<TrackerSnapshot>,
}

struct WorkerTrackers<'a>(&'a mut dyn JobWorker);

impl TrackerLifecycle for WorkerTrackers<'_> {
    fn start_trackers(&mut self) {
        self.0.start_trackers();
    }

    fn stop_trackers(&mut self) {
        self.0.stop_trackers();
    }
}

/// Runs `worker` until `stop` fires or an iteration fails.
///
/// Protocol-level failures never reach this loop. An `Err` from
/// `run_iteration` ends this thread only, with
/// [`JobStatus::CompletedWithErrors`].
pub fn run_worker(
    thread_id: &str,
    worker: &mut dyn JobWorker,
    settings: &LoopSettings,
    limiter: &dyn RateLimiter,
    stop: &StopSignal,
    clock: &SharedClock,
) -> WorkerOutcome {
    info!(thread_id, "worker started");

    let mut window = StatisticsWindowController::begin(
        settings.window,
        settings.job_stop_millis,
        clock.epoch_millis(),
        &mut WorkerTrackers(&mut *worker),
    );

    let mut status = JobStatus::Completed;
    let mut failure = None;
    let mut iterations = 0_u64;
    let mut reconnects = 0_u64;
    let mut since_reconnect = 0_u64;

    while !stop.should_stop() {
        if limiter.await_slot() {
            continue;
        }

        if settings.operations_between_reconnects > 0 {
            since_reconnect += 1;
            if since_reconnect >= settings.operations_between_reconnects {
                worker.reconnect();
                reconnects += 1;
                since_reconnect = 0;
            }
        }

        let transition = window.evaluate(clock.epoch_millis(), &mut WorkerTrackers(&mut *worker));
        if transition != Transition::None {
            debug!(thread_id, ?transition, iterations, "statistics window changed");
        }

        iterations += 1;
        if let Err(err) = worker.run_iteration(window.is_collecting()) {
            error!(thread_id, error = %err, iterations, "worker stopped by a fatal error");
            status = JobStatus::CompletedWithErrors;
            failure = Some(err.to_string());
            break;
        }
    }

    window.finish(&mut WorkerTrackers(&mut *worker));
    worker.close();

    info!(thread_id, iterations, reconnects, %status, "worker finished");

    WorkerOutcome {
        thread_id: thread_id.to_string(),
        status,
        iterations,
        reconnects,
        error: failure,
        snapshots: worker.snapshots(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JobError, JobResult};
    use ldaprate_core::{ManualClock, Unlimited};
    use std::time::Duration;

    /// Records calls and asks to stop after a fixed number of iterations.
    struct Scripted {
        stop: StopSignal,
        clock: Arc<ManualClock>,
        limit: u64,
        fail_on: Option<u64>,
        iterations: u64,
        collecting: Vec<bool>,
        reconnected_before: Vec<u64>,
        starts: u32,
        stops: u32,
        closed: bool,
    }

    impl Scripted {
        fn new(stop: StopSignal, clock: Arc<ManualClock>, limit: u64) -> Self {
            Self {
                stop,
                clock,
                limit,
                fail_on: None,
                iterations: 0,
                collecting: Vec::new(),
                reconnected_before: Vec::new(),
                starts: 0,
                stops: 0,
                closed: false,
            }
        }
    }

    impl JobWorker for Scripted {
        fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
            self.iterations += 1;
            self.collecting.push(collecting);
            self.clock.advance(Duration::from_millis(1));
            if self.fail_on == Some(self.iterations) {
                return Err(JobError::malformed("search filter", "(uid=", "unbalanced"));
            }
            if self.iterations >= self.limit {
                self.stop.request();
            }
            Ok(())
        }

        fn reconnect(&mut self) {
            self.reconnected_before.push(self.iterations + 1);
        }

        fn start_trackers(&mut self) {
            self.starts += 1;
        }

        fn stop_trackers(&mut self) {
            self.stops += 1;
        }

        fn snapshots(&self) -> Vec<TrackerSnapshot> {
            Vec::new()
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn run(worker: &mut Scripted, settings: &LoopSettings, clock: SharedClock) -> WorkerOutcome {
        let stop = worker.stop.clone();
        run_worker("thread-0", worker, settings, &Unlimited, &stop, &clock)
    }

    #[test]
    fn test_reconnects_every_n_iterations() {
        let clock = ManualClock::shared(0);
        let stop = StopSignal::new(clock.clone());
        let mut worker = Scripted::new(stop, clock.clone(), 17);
        let settings = LoopSettings {
            operations_between_reconnects: 5,
            ..LoopSettings::default()
        };

        let outcome = run(&mut worker, &settings, clock);

        assert_eq!(outcome.iterations, 17);
        assert_eq!(outcome.reconnects, 3);
        assert_eq!(worker.reconnected_before, vec![5, 10, 15]);
    }

    #[test]
    fn test_zero_never_reconnects() {
        let clock = ManualClock::shared(0);
        let stop = StopSignal::new(clock.clone());
        let mut worker = Scripted::new(stop, clock.clone(), 12);

        let outcome = run(&mut worker, &LoopSettings::default(), clock);

        assert_eq!(outcome.reconnects, 0);
        assert!(worker.reconnected_before.is_empty());
    }

    #[test]
    fn test_warm_up_withholds_collection() {
        let clock = ManualClock::shared(1_000);
        let stop = StopSignal::new(clock.clone());
        let mut worker = Scripted::new(stop, clock.clone(), 50);
        let settings = LoopSettings {
            window: WindowConfig {
                warm_up: Some(Duration::from_millis(10)),
                cool_down: None,
            },
            ..LoopSettings::default()
        };

        run(&mut worker, &settings, clock);

        assert_eq!(worker.collecting.iter().filter(|c| **c).count(), 40);
        assert_eq!((worker.starts, worker.stops), (1, 1));
    }

    #[test]
    fn test_fatal_error_ends_thread_and_flushes_trackers() {
        let clock = ManualClock::shared(0);
        let stop = StopSignal::new(clock.clone());
        let mut worker = Scripted::new(stop, clock.clone(), 100);
        worker.fail_on = Some(3);

        let outcome = run(&mut worker, &LoopSettings::default(), clock);

        assert_eq!(outcome.status, JobStatus::CompletedWithErrors);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.error.unwrap().contains("search filter"));
        assert_eq!(worker.stops, 1);
        assert!(worker.closed);
    }

    #[test]
    fn test_stop_time_ends_loop() {
        let clock = ManualClock::shared(0);
        let stop = StopSignal::new(clock.clone()).with_stop_at(Some(25));
        let mut worker = Scripted::new(stop, clock.clone(), u64::MAX);

        let outcome = run(&mut worker, &LoopSettings::default(), clock);

        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(outcome.iterations, 25);
    }

    #[test]
    fn test_stop_signal_clones_share_flag() {
        let clock = ManualClock::shared(0);
        let stop = StopSignal::new(clock);
        let other = stop.clone();

        assert!(!other.should_stop());
        stop.request();
        assert!(other.should_stop());
    }
}
