use super::series::{IntervalSeries, Lifecycle};
use super::{
    RealTimeHook, RealTimeReporter, SnapshotData, StatTracker, TrackerDescriptor, TrackerKind,
    TrackerSnapshot,
};
use crate::clock::SharedClock;
use std::sync::Arc;

/// Counts how many times something happened.
#[derive(Debug)]
pub struct IncrementalTracker {
    descriptor: TrackerDescriptor,
    clock: SharedClock,
    lifecycle: Lifecycle,
    series: IntervalSeries<u64>,
    total: u64,
    real_time: Option<RealTimeHook>,
}

impl IncrementalTracker {
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
            TrackerKind::Incremental,
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
            total: 0,
            real_time: None,
        }
    }

    /// Pushes every increment to `reporter`.
    pub fn enable_real_time(&mut self, reporter: Arc<dyn RealTimeReporter>, job_id: &str) {
        self.real_time = Some(RealTimeHook::new(reporter, job_id));
    }

    /// Adds one occurrence.
    pub fn increment(&mut self) {
        if !self.lifecycle.is_running() {
            return;
        }
        *self.series.at(self.clock.epoch_millis()) += 1;
        self.total += 1;

        if let Some(hook) = &self.real_time {
            hook.report(&self.descriptor, 1.0);
        }
    }

    /// Occurrences since the tracker was started.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl StatTracker for IncrementalTracker {
    fn descriptor(&self) -> &TrackerDescriptor {
        &self.descriptor
    }

    fn start(&mut self) {
        let now = self.clock.epoch_millis();
        self.lifecycle.start(&self.descriptor.display_name, now);
        self.series = IntervalSeries::new(self.descriptor.interval_millis(), now);
        self.total = 0;
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
            data: SnapshotData::Incremental {
                intervals: self.series.completed().to_vec(),
                total: self.total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_increment_only_while_running() {
        let clock = ManualClock::shared(0);
        let mut completed = IncrementalTracker::new("Binds Completed", "c", "t", 1, clock.clone());

        completed.increment();
        completed.start();
        completed.increment();
        completed.increment();
        clock.advance(Duration::from_secs(1));
        completed.increment();
        completed.stop();
        completed.increment();

        assert_eq!(completed.total(), 3);
        match completed.snapshot().data {
            SnapshotData::Incremental { intervals, total } => {
                assert_eq!(intervals, vec![2]);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected data {other:?}"),
        }
    }
}
