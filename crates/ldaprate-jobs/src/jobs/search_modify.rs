//! A search followed by one modify per entry it returned.
//!
//! Entries that arrived before a search failed are modified too.

use super::{
    entries_descriptor, ModificationGenerator, ModificationSet, SearchGenerator, SearchTemplate,
    ENTRIES_RETURNED,
};
use crate::client::{ConnectionPool, Entry, ModifyRequest, PoolRole, ResultCode};
use crate::config::Config;
use crate::error::JobResult;
use crate::job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext};
use crate::trackers::{start_all, stop_all, OperationNames, OperationTrackers};
use ldaprate_core::{
    IntegerValueTracker, SharedClock, StatTracker, TrackerDescriptor, TrackerSnapshot,
};
use rand::rngs::StdRng;

const SEARCH: OperationNames = OperationNames {
    completed: Some("Searches Completed"),
    duration: "Search Duration (ms)",
    result_codes: Some("Result Codes"),
    categories: "Search Response Time Categories",
};

const MODIFY: OperationNames = OperationNames {
    completed: Some("Modifies Completed"),
    duration: "Modify Duration (ms)",
    result_codes: Some("Modify Result Codes"),
    categories: "Modify Response Time Categories",
};

/// Modifies every entry a generated search returns.
#[derive(Debug)]
pub struct SearchAndModifyJob {
    search: SearchTemplate,
    modifications: ModificationSet,
}

impl SearchAndModifyJob {
    /// # Errors
    ///
    /// Returns `JobError::InvalidParameter` for a pattern that does not
    /// compile or a bad attribute list.
    pub fn from_config(config: &Config) -> JobResult<Self> {
        let search = SearchTemplate::from_config(&config.search)?;
        let size_limit = config.search.size_limit;
        Ok(Self {
            search: search.restricted(vec!["1.1".to_string()], size_limit),
            modifications: ModificationSet::from_config(&config.modify)?,
        })
    }
}

impl JobDefinition for SearchAndModifyJob {
    fn kind(&self) -> JobKind {
        JobKind::SearchAndModify
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        super::parameter_schema(JobKind::SearchAndModify)
    }

    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        let mut schema = SEARCH.descriptors(client_id, thread_id, interval_secs);
        schema.push(entries_descriptor(client_id, thread_id, interval_secs));
        schema.extend(MODIFY.descriptors(client_id, thread_id, interval_secs));
        schema
    }

    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>> {
        let search_pool = context.factory.connect(PoolRole::Search)?;
        let modify_pool = context.factory.connect(PoolRole::Modify)?;
        Ok(Box::new(SearchAndModifyWorker {
            search: self.search.generator(),
            modifications: self.modifications.generator(),
            search_pool,
            modify_pool,
            search_trackers: OperationTrackers::new(&SEARCH, &context.trackers),
            entries_returned: context.trackers.integer_value(ENTRIES_RETURNED),
            modify_trackers: OperationTrackers::new(&MODIFY, &context.trackers),
            clock: context.clock,
            rng: context.rng,
        }))
    }
}

struct SearchAndModifyWorker {
    search: SearchGenerator,
    modifications: ModificationGenerator,
    search_pool: Box<dyn ConnectionPool>,
    modify_pool: Box<dyn ConnectionPool>,
    search_trackers: OperationTrackers,
    entries_returned: IntegerValueTracker,
    modify_trackers: OperationTrackers,
    clock: SharedClock,
    rng: StdRng,
}

impl SearchAndModifyWorker {
    fn all_trackers(&mut self) -> Vec<&mut dyn StatTracker> {
        let mut all = self.search_trackers.all_mut();
        all.push(&mut self.entries_returned);
        all.extend(self.modify_trackers.all_mut());
        all
    }

    fn modify_entry(&mut self, entry: &Entry, collecting: bool) {
        let request = ModifyRequest {
            dn: entry.dn.clone(),
            modifications: self.modifications.next_modifications(&mut self.rng),
        };

        let start = self.clock.nanos();
        let result = self.modify_pool.modify(&request);
        let end = self.clock.nanos();

        if collecting {
            let code = match &result {
                Ok(()) => ResultCode::SUCCESS,
                Err(failure) => failure.code,
            };
            self.modify_trackers.record(Some(code), start, end);
        }
    }
}

impl JobWorker for SearchAndModifyWorker {
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
        let request = self.search.next_request(&mut self.rng)?;

        let start = self.clock.nanos();
        let result = self.search_pool.search(&request);
        let end = self.clock.nanos();

        let entries = match result {
            Ok(response) => {
                if collecting {
                    self.search_trackers
                        .record(Some(ResultCode::SUCCESS), start, end);
                    self.entries_returned
                        .add_value(i64::try_from(response.entries.len()).unwrap_or(i64::MAX));
                }
                response.entries
            }
            Err(failure) => {
                if collecting {
                    self.search_trackers
                        .record(Some(failure.failure.code), start, end);
                }
                failure.partial_entries
            }
        };

        for entry in &entries {
            self.modify_entry(entry, collecting);
        }
        Ok(())
    }

    fn reconnect(&mut self) {
        self.search_pool.shrink();
        self.modify_pool.shrink();
    }

    fn start_trackers(&mut self) {
        start_all(self.all_trackers());
    }

    fn stop_trackers(&mut self) {
        stop_all(self.all_trackers());
    }

    fn snapshots(&self) -> Vec<TrackerSnapshot> {
        let mut snapshots = self.search_trackers.snapshots();
        snapshots.push(self.entries_returned.snapshot());
        snapshots.extend(self.modify_trackers.snapshots());
        snapshots
    }

    fn close(&mut self) {
        self.search_pool.close();
        self.modify_pool.close();
    }
}
