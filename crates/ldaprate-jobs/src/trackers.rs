//! Tracker bundles shared by the job implementations.

use crate::client::ResultCode;
use ldaprate_core::{
    CategoricalCounter, IncrementalTracker, IntegerValueTracker, RealTimeReporter,
    ResponseTimeCategorizer, SharedClock, StatTracker, TimeTracker, TrackerDescriptor,
    TrackerSnapshot,
};
use std::sync::Arc;

/// Identity and settings every tracker of one worker shares.
#[derive(Clone)]
pub struct TrackerContext {
    pub client_id: String,
    pub thread_id: String,
    pub collection_interval_secs: u32,
    pub clock: SharedClock,
    pub real_time: Option<(Arc<dyn RealTimeReporter>, String)>,
}

impl std::fmt::Debug for TrackerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerContext")
            .field("client_id", &self.client_id)
            .field("thread_id", &self.thread_id)
            .field("collection_interval_secs", &self.collection_interval_secs)
            .field("real_time", &self.real_time.is_some())
            .finish_non_exhaustive()
    }
}

impl TrackerContext {
    fn incremental(&self, name: &str) -> IncrementalTracker {
        let mut tracker = IncrementalTracker::new(
            name,
            self.client_id.clone(),
            self.thread_id.clone(),
            self.collection_interval_secs,
            self.clock.clone(),
        );
        if let Some((reporter, job_id)) = &self.real_time {
            tracker.enable_real_time(reporter.clone(), job_id);
        }
        tracker
    }

    fn timer(&self, name: &str) -> TimeTracker {
        let mut tracker = TimeTracker::new(
            name,
            self.client_id.clone(),
            self.thread_id.clone(),
            self.collection_interval_secs,
            self.clock.clone(),
        );
        if let Some((reporter, job_id)) = &self.real_time {
            tracker.enable_real_time(reporter.clone(), job_id);
        }
        tracker
    }

    fn categorical(&self, name: &str) -> CategoricalCounter {
        CategoricalCounter::new(
            name,
            self.client_id.clone(),
            self.thread_id.clone(),
            self.collection_interval_secs,
            self.clock.clone(),
        )
    }

    fn categorizer(&self, name: &str) -> ResponseTimeCategorizer {
        ResponseTimeCategorizer::with_name(
            name,
            self.client_id.clone(),
            self.thread_id.clone(),
            self.collection_interval_secs,
            self.clock.clone(),
        )
    }

    /// A standalone integer-value tracker.
    #[must_use]
    pub fn integer_value(&self, name: &str) -> IntegerValueTracker {
        IntegerValueTracker::new(
            name,
            self.client_id.clone(),
            self.thread_id.clone(),
            self.collection_interval_secs,
            self.clock.clone(),
        )
    }
}

/// Tracker names for one kind of operation.
///
/// `completed` and `result_codes` are optional because the overall
/// authentication of a search-and-bind has no result code of its own, and
/// its search and bind steps are not counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationNames {
    pub completed: Option<&'static str>,
    pub duration: &'static str,
    pub result_codes: Option<&'static str>,
    pub categories: &'static str,
}

impl OperationNames {
    /// Registration-time descriptors, in reporting order.
    #[must_use]
    pub fn descriptors(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        use ldaprate_core::TrackerKind;

        let mut descriptors = Vec::new();
        if let Some(name) = self.completed {
            descriptors.push(TrackerDescriptor::new(
                name,
                TrackerKind::Incremental,
                client_id,
                thread_id,
                interval_secs,
            ));
        }
        descriptors.push(TrackerDescriptor::new(
            self.duration,
            TrackerKind::Time,
            client_id,
            thread_id,
            interval_secs,
        ));
        if let Some(name) = self.result_codes {
            descriptors.push(CategoricalCounter::descriptor_stub(
                name,
                client_id,
                thread_id,
                interval_secs,
            ));
        }
        descriptors.push(ResponseTimeCategorizer::descriptor_stub(
            self.categories,
            client_id,
            thread_id,
            interval_secs,
        ));
        descriptors
    }
}

/// Live trackers for one kind of operation.
#[derive(Debug)]
pub struct OperationTrackers {
    pub completed: Option<IncrementalTracker>,
    pub duration: TimeTracker,
    pub result_codes: Option<CategoricalCounter>,
    pub categories: ResponseTimeCategorizer,
}

impl OperationTrackers {
    #[must_use]
    pub fn new(names: &OperationNames, context: &TrackerContext) -> Self {
        Self {
            completed: names.completed.map(|name| context.incremental(name)),
            duration: context.timer(names.duration),
            result_codes: names.result_codes.map(|name| context.categorical(name)),
            categories: context.categorizer(names.categories),
        }
    }

    /// Records one step that ran from `start_nanos` to `end_nanos`.
    ///
    /// `code` is `None` for a step that has no result code of its own.
    pub fn record(&mut self, code: Option<ResultCode>, start_nanos: i64, end_nanos: i64) {
        let elapsed = end_nanos.saturating_sub(start_nanos).max(0);
        self.duration
            .record(std::time::Duration::from_nanos(elapsed as u64));
        if let Some(tracker) = &mut self.completed {
            tracker.increment();
        }
        if let (Some(counter), Some(code)) = (&mut self.result_codes, code) {
            counter.increment(&code.to_string());
        }
        self.categories.categorize(start_nanos, end_nanos);
    }

    /// Counts a result code without timing anything.
    pub fn record_code(&mut self, code: ResultCode) {
        if let Some(counter) = &mut self.result_codes {
            counter.increment(&code.to_string());
        }
    }

    /// Every tracker in the bundle.
    pub fn all_mut(&mut self) -> Vec<&mut dyn StatTracker> {
        let mut all: Vec<&mut dyn StatTracker> = Vec::new();
        if let Some(tracker) = &mut self.completed {
            all.push(tracker);
        }
        all.push(&mut self.duration);
        if let Some(counter) = &mut self.result_codes {
            all.push(counter);
        }
        all.push(&mut self.categories);
        all
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<TrackerSnapshot> {
        let mut snapshots = Vec::new();
        if let Some(tracker) = &self.completed {
            snapshots.push(tracker.snapshot());
        }
        snapshots.push(self.duration.snapshot());
        if let Some(counter) = &self.result_codes {
            snapshots.push(counter.snapshot());
        }
        snapshots.push(self.categories.snapshot());
        snapshots
    }
}

/// Starts a list of trackers.
pub fn start_all(trackers: Vec<&mut dyn StatTracker>) {
    for tracker in trackers {
        tracker.start();
    }
}

/// Stops a list of trackers.
pub fn stop_all(trackers: Vec<&mut dyn StatTracker>) {
    for tracker in trackers {
        tracker.stop();
    }
}
