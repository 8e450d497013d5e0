use super::series::{IntervalSeries, Lifecycle};
use super::{
    RealTimeHook, RealTimeReporter, SnapshotData, StatTracker, TimeInterval, TrackerDescriptor,
    TrackerKind, TrackerSnapshot,
};
use crate::clock::SharedClock;
use std::sync::Arc;
use std::time::Duration;

/// Tracks how long operations take.
#[derive(Debug)]
pub struct TimeTracker {
    descriptor: TrackerDescriptor,
    clock: SharedClock,
    lifecycle: Lifecycle,
    series: IntervalSeries<TimeInterval>,
    total: TimeInterval,
    min_nanos: Option<u64>,
    max_nanos: Option<u64>,
    real_time: Option<RealTimeHook>,
}

impl TimeTracker {
    /// Creates a tracker that has not been started.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
        clock: SharedClock,
    ) -> Self {
        let descriptor = TrackerDescriptor::new(
            display_name,
            TrackerKind::Time,
            client_id,
            thread_id,
            collection_interval_secs,
        );
        let series = IntervalSeries::new(descriptor.interval_millis(), clock.epoch_millis());
        Self {
            descriptor,
            clock,
            lifecycle: Lifecycle::new(),
            series,
            total: TimeInterval::default(),
            min_nanos: None,
            max_nanos: None,
            real_time: None,
        }
    }

    /// Pushes every recorded duration, in milliseconds, to `reporter`.
    pub fn enable_real_time(&mut self, reporter: Arc<dyn RealTimeReporter>, job_id: &str) {
        self.real_time = Some(RealTimeHook::new(reporter, job_id));
    }

    /// Records one operation that took `elapsed`.
    ///
    /// Ignored unless the tracker is running.
    pub fn record(&mut self, elapsed: Duration) {
        if !self.lifecycle.is_running() {
            return;
        }

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let interval = self.series.at(self.clock.epoch_millis());
        interval.count += 1;
        interval.total_nanos = interval.total_nanos.saturating_add(nanos);
        self.total.count += 1;
        self.total.total_nanos = self.total.total_nanos.saturating_add(nanos);
        self.min_nanos = Some(self.min_nanos.map_or(nanos, |min| min.min(nanos)));
        self.max_nanos = Some(self.max_nanos.map_or(nanos, |max| max.max(nanos)));

        if let Some(hook) = &self.real_time {
            hook.report(&self.descriptor, nanos as f64 / 1_000_000.0);
        }
    }

    /// Number of operations recorded since the tracker was started.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.total.count
    }

    /// Mean operation duration since the tracker was started.
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        (self.total.count > 0).then(|| Duration::from_nanos(self.total.total_nanos / self.total.count))
    }
}

impl StatTracker for TimeTracker {
    fn descriptor(&self) -> &TrackerDescriptor {
        &self.descriptor
    }

    fn start(&mut self) {
        let now = self.clock.epoch_millis();
        self.lifecycle.start(&self.descriptor.display_name, now);
        self.series = IntervalSeries::new(self.descriptor.interval_millis(), now);
        self.total = TimeInterval::default();
        self.min_nanos = None;
        self.max_nanos = None;
    }

    fn stop(&mut self) {
        if self.lifecycle.stop(&self.descriptor.display_name) {
            let stopped_at = self.series.close(self.clock.epoch_millis());
            self.lifecycle.record_stop(stopped_at);
        }
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            descriptor: self.descriptor.clone(),
            started_at_millis: self.lifecycle.started_at(),
            stopped_at_millis: self.lifecycle.stopped_at(),
            data: SnapshotData::Time {
                intervals: self.series.completed().to_vec(),
                total: self.total,
                min_nanos: self.min_nanos,
                max_nanos: self.max_nanos,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<(String, String, f64)>>,
    }

    impl RealTimeReporter for Recorder {
        fn report(&self, job_id: &str, tracker: &TrackerDescriptor, value: f64) {
            self.values
                .lock()
                .push((job_id.to_string(), tracker.display_name.clone(), value));
        }
    }

    #[test]
    fn test_records_min_max_and_average() {
        let clock = ManualClock::shared(0);
        let mut timer = TimeTracker::new("Bind Duration (ms)", "c", "t", 60, clock);
        timer.start();

        timer.record(Duration::from_millis(4));
        timer.record(Duration::from_millis(2));

        assert_eq!(timer.count(), 2);
        assert_eq!(timer.average(), Some(Duration::from_millis(3)));
        match timer.snapshot().data {
            SnapshotData::Time {
                min_nanos,
                max_nanos,
                ..
            } => {
                assert_eq!(min_nanos, Some(2_000_000));
                assert_eq!(max_nanos, Some(4_000_000));
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn test_record_before_start_is_ignored() {
        let clock = ManualClock::shared(0);
        let mut timer = TimeTracker::new("Bind Duration (ms)", "c", "t", 60, clock);
        timer.record(Duration::from_millis(3));
        assert_eq!(timer.count(), 0);
        assert_eq!(timer.average(), None);
    }

    #[test]
    fn test_real_time_reporting() {
        let clock = ManualClock::shared(0);
        let recorder = Arc::new(Recorder::default());
        let mut timer = TimeTracker::new("Search Duration (ms)", "c", "t", 60, clock);
        timer.enable_real_time(recorder.clone(), "job-1");
        timer.start();

        timer.record(Duration::from_micros(1_500));

        let values = recorder.values.lock();
        assert_eq!(
            values.as_slice(),
            &[("job-1".to_string(), "Search Duration (ms)".to_string(), 1.5)]
        );
    }
}
