use super::series::{IntervalSeries, Lifecycle};
use super::{
    SnapshotData, StatTracker, TrackerDescriptor, TrackerKind, TrackerSnapshot, ValueInterval,
};
use crate::clock::SharedClock;

/// Collects integer samples, such as the number of entries a search returned.
#[derive(Debug)]
pub struct IntegerValueTracker {
    descriptor: TrackerDescriptor,
    clock: SharedClock,
    lifecycle: Lifecycle,
    series: IntervalSeries<ValueInterval>,
    total: ValueInterval,
}

impl IntegerValueTracker {
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
            TrackerKind::IntegerValue,
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
            total: ValueInterval::default(),
        }
    }

    /// Records one sample.
    pub fn add_value(&mut self, value: i64) {
        if !self.lifecycle.is_running() {
            return;
        }
        let interval = self.series.at(self.clock.epoch_millis());
        interval.count += 1;
        interval.sum += value;
        self.total.count += 1;
        self.total.sum += value;
    }

    /// Mean of all samples since the tracker was started.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        (self.total.count > 0).then(|| self.total.sum as f64 / self.total.count as f64)
    }
}

impl StatTracker for IntegerValueTracker {
    fn descriptor(&self) -> &TrackerDescriptor {
        &self.descriptor
    }

    fn start(&mut self) {
        let now = self.clock.epoch_millis();
        self.lifecycle.start(&self.descriptor.display_name, now);
        self.series = IntervalSeries::new(self.descriptor.interval_millis(), now);
        self.total = ValueInterval::default();
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
            data: SnapshotData::IntegerValue {
                intervals: self.series.completed().to_vec(),
                total: self.total,
            },
        }
    }
}
