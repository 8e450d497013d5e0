use super::series::{IntervalSeries, Lifecycle};
use super::{SnapshotData, StatTracker, TrackerDescriptor, TrackerKind, TrackerSnapshot};
use crate::clock::SharedClock;
use std::collections::HashMap;

/// Counts occurrences per category label.
///
/// Categories are created on first use and reported in first-seen order.
#[derive(Debug)]
pub struct CategoricalCounter {
    descriptor: TrackerDescriptor,
    clock: SharedClock,
    lifecycle: Lifecycle,
    categories: Vec<String>,
    positions: HashMap<String, usize>,
    totals: Vec<u64>,
    series: IntervalSeries<Vec<u64>>,
}

impl CategoricalCounter {
    /// Creates a counter that has not been started.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
        clock: SharedClock,
    ) -> Self {
        let descriptor = Self::descriptor_stub(
            display_name,
            client_id,
            thread_id,
            collection_interval_secs,
        );
        let series = IntervalSeries::new(descriptor.interval_millis(), clock.epoch_millis());
        Self {
            descriptor,
            clock,
            lifecycle: Lifecycle::new(),
            categories: Vec::new(),
            positions: HashMap::new(),
            totals: Vec::new(),
            series,
        }
    }

    /// Describes a counter without creating one.
    #[must_use]
    pub fn descriptor_stub(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
    ) -> TrackerDescriptor {
        TrackerDescriptor::new(
            display_name,
            TrackerKind::Categorical,
            client_id,
            thread_id,
            collection_interval_secs,
        )
    }

    /// Adds one occurrence of `category`.
    pub fn increment(&mut self, category: &str) {
        if !self.lifecycle.is_running() {
            return;
        }

        let position = match self.positions.get(category) {
            Some(&position) => position,
            None => {
                self.categories.push(category.to_string());
                self.totals.push(0);
                let position = self.categories.len() - 1;
                self.positions.insert(category.to_string(), position);
                position
            }
        };
        self.totals[position] += 1;

        let counts = self.series.at(self.clock.epoch_millis());
        if counts.len() <= position {
            counts.resize(position + 1, 0);
        }
        counts[position] += 1;
    }

    /// Total occurrences of `category` since the counter was started.
    #[must_use]
    pub fn count(&self, category: &str) -> u64 {
        self.positions
            .get(category)
            .map_or(0, |&position| self.totals[position])
    }

    /// Total occurrences across all categories.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.totals.iter().sum()
    }

    /// Categories with their totals, in first-seen order.
    pub fn counts(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.categories
            .iter()
            .map(String::as_str)
            .zip(self.totals.iter().copied())
    }
}

impl StatTracker for CategoricalCounter {
    fn descriptor(&self) -> &TrackerDescriptor {
        &self.descriptor
    }

    fn start(&mut self) {
        let now = self.clock.epoch_millis();
        self.lifecycle.start(&self.descriptor.display_name, now);
        self.categories.clear();
        self.positions.clear();
        self.totals.clear();
        self.series = IntervalSeries::new(self.descriptor.interval_millis(), now);
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
        let width = self.categories.len();
        let intervals = self
            .series
            .completed()
            .iter()
            .map(|counts| {
                let mut counts = counts.clone();
                counts.resize(width, 0);
                counts
            })
            .collect();

        TrackerSnapshot {
            descriptor: self.descriptor.clone(),
            started_at_millis: self.lifecycle.started_at(),
            stopped_at_millis: self.lifecycle.stopped_at(),
            data: SnapshotData::Categorical {
                categories: self.categories.clone(),
                totals: self.totals.clone(),
                intervals,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn counter(clock: &Arc<ManualClock>) -> CategoricalCounter {
        CategoricalCounter::new("Result Codes", "client-0", "thread-0", 1, clock.clone())
    }

    #[test]
    fn test_increments_before_start_are_ignored() {
        let clock = ManualClock::shared(0);
        let mut codes = counter(&clock);

        codes.increment("0 (success)");
        assert_eq!(codes.total(), 0);

        codes.start();
        codes.increment("0 (success)");
        assert_eq!(codes.count("0 (success)"), 1);
    }

    #[test]
    fn test_categories_keep_first_seen_order() {
        let clock = ManualClock::shared(0);
        let mut codes = counter(&clock);
        codes.start();

        codes.increment("32 (no such object)");
        codes.increment("0 (success)");
        codes.increment("32 (no such object)");

        let counts: Vec<(&str, u64)> = codes.counts().collect();
        assert_eq!(counts, vec![("32 (no such object)", 2), ("0 (success)", 1)]);
        assert_eq!(codes.count("49 (invalid credentials)"), 0);
    }

    #[test]
    fn test_intervals_are_padded_and_aligned() {
        let clock = ManualClock::shared(0);
        let mut codes = counter(&clock);
        codes.start();

        codes.increment("a");
        clock.advance(Duration::from_millis(2_500));
        codes.increment("b");
        clock.advance(Duration::from_millis(600));
        codes.stop();

        let snapshot = codes.snapshot();
        assert_eq!(snapshot.stopped_at_millis, Some(3_000));
        match snapshot.data {
            SnapshotData::Categorical { intervals, .. } => {
                assert_eq!(intervals, vec![vec![1, 0], vec![0, 0], vec![0, 1]]);
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn test_start_resets_previous_counts() {
        let clock = ManualClock::shared(0);
        let mut codes = counter(&clock);
        codes.start();
        codes.increment("a");
        codes.stop();

        codes.start();
        assert_eq!(codes.total(), 0);
        assert!(codes.is_running());
    }
}
