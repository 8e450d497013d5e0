//! Repeated searches with generated bases and filters.

use super::{entries_descriptor, SearchGenerator, SearchTemplate, ENTRIES_RETURNED};
use crate::client::{ConnectionPool, PoolRole, ResultCode};
use crate::config::Config;
use crate::error::JobResult;
use crate::job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext};
use crate::trackers::{start_all, stop_all, OperationNames, OperationTrackers};
use ldaprate_core::{
    IntegerValueTracker, SharedClock, StatTracker, TrackerDescriptor, TrackerSnapshot,
    DEFAULT_CATEGORIZER_NAME,
};
use rand::rngs::StdRng;

const NAMES: OperationNames = OperationNames {
    completed: Some("Searches Completed"),
    duration: "Search Duration (ms)",
    result_codes: Some("Result Codes"),
    categories: DEFAULT_CATEGORIZER_NAME,
};

/// Searches with one of two filters, chosen by percentage.
#[derive(Debug)]
pub struct SearchJob {
    search: SearchTemplate,
}

impl SearchJob {
    /// # Errors
    ///
    /// Returns `JobError::InvalidParameter` for a pattern that does not
    /// compile.
    pub fn from_config(config: &Config) -> JobResult<Self> {
        Ok(Self {
            search: SearchTemplate::from_config(&config.search)?,
        })
    }
}

impl JobDefinition for SearchJob {
    fn kind(&self) -> JobKind {
        JobKind::Search
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        super::parameter_schema(JobKind::Search)
    }

    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        let mut schema = NAMES.descriptors(client_id, thread_id, interval_secs);
        schema.push(entries_descriptor(client_id, thread_id, interval_secs));
        schema
    }

    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>> {
        let pool = context.factory.connect(PoolRole::Search)?;
        Ok(Box::new(SearchWorker {
            search: self.search.generator(),
            pool,
            trackers: OperationTrackers::new(&NAMES, &context.trackers),
            entries_returned: context.trackers.integer_value(ENTRIES_RETURNED),
            clock: context.clock,
            rng: context.rng,
        }))
    }
}

struct SearchWorker {
    search: SearchGenerator,
    pool: Box<dyn ConnectionPool>,
    trackers: OperationTrackers,
    entries_returned: IntegerValueTracker,
    clock: SharedClock,
    rng: StdRng,
}

impl JobWorker for SearchWorker {
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
        let request = self.search.next_request(&mut self.rng)?;

        let start = self.clock.nanos();
        let result = self.pool.search(&request);
        let end = self.clock.nanos();

        if collecting {
            match &result {
                Ok(response) => {
                    self.trackers.record(Some(ResultCode::SUCCESS), start, end);
                    self.entries_returned
                        .add_value(i64::try_from(response.entries.len()).unwrap_or(i64::MAX));
                }
                Err(failure) => self.trackers.record(Some(failure.failure.code), start, end),
            }
        }
        Ok(())
    }

    fn reconnect(&mut self) {
        self.pool.shrink();
    }

    fn start_trackers(&mut self) {
        let mut all = self.trackers.all_mut();
        all.push(&mut self.entries_returned);
        start_all(all);
    }

    fn stop_trackers(&mut self) {
        let mut all = self.trackers.all_mut();
        all.push(&mut self.entries_returned);
        stop_all(all);
    }

    fn snapshots(&self) -> Vec<TrackerSnapshot> {
        let mut snapshots = self.trackers.snapshots();
        snapshots.push(self.entries_returned.snapshot());
        snapshots
    }

    fn close(&mut self) {
        self.pool.close();
    }
}
