//! Repeated replace modifications of generated entries.

use super::{compile, ModificationGenerator, ModificationSet};
use crate::client::{ConnectionPool, ModifyRequest, PoolRole, ResultCode};
use crate::config::Config;
use crate::error::JobResult;
use crate::job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext};
use crate::trackers::{start_all, stop_all, OperationNames, OperationTrackers};
use crate::value::{ValueGenerator, ValuePattern};
use ldaprate_core::{SharedClock, TrackerDescriptor, TrackerSnapshot, DEFAULT_CATEGORIZER_NAME};
use rand::rngs::StdRng;
use std::sync::Arc;

pub(crate) const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "modify.dn",
        "Entry DN",
        "The DN of the entry to modify. May be a value pattern.",
        Some("uid=user.[1-1000],ou=People,dc=example,dc=com"),
    ),
];

const NAMES: OperationNames = OperationNames {
    completed: Some("Modifies Completed"),
    duration: "Modify Duration (ms)",
    result_codes: Some("Result Codes"),
    categories: DEFAULT_CATEGORIZER_NAME,
};

/// Replaces attribute values of generated entries.
#[derive(Debug)]
pub struct ModifyJob {
    dn: Arc<ValuePattern>,
    modifications: ModificationSet,
}

impl ModifyJob {
    /// # Errors
    ///
    /// Returns `JobError::InvalidParameter` for a bad DN pattern or
    /// attribute list.
    pub fn from_config(config: &Config) -> JobResult<Self> {
        Ok(Self {
            dn: compile("modify.dn", &config.modify.dn)?,
            modifications: ModificationSet::from_config(&config.modify)?,
        })
    }
}

impl JobDefinition for ModifyJob {
    fn kind(&self) -> JobKind {
        JobKind::Modify
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        super::parameter_schema(JobKind::Modify)
    }

    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        NAMES.descriptors(client_id, thread_id, interval_secs)
    }

    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>> {
        let pool = context.factory.connect(PoolRole::Modify)?;
        Ok(Box::new(ModifyWorker {
            dn: ValueGenerator::new(self.dn.clone()),
            modifications: self.modifications.generator(),
            pool,
            trackers: OperationTrackers::new(&NAMES, &context.trackers),
            clock: context.clock,
            rng: context.rng,
        }))
    }
}

struct ModifyWorker {
    dn: ValueGenerator,
    modifications: ModificationGenerator,
    pool: Box<dyn ConnectionPool>,
    trackers: OperationTrackers,
    clock: SharedClock,
    rng: StdRng,
}

impl JobWorker for ModifyWorker {
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
        let request = ModifyRequest {
            dn: self.dn.next_value(&mut self.rng),
            modifications: self.modifications.next_modifications(&mut self.rng),
        };

        let start = self.clock.nanos();
        let result = self.pool.modify(&request);
        let end = self.clock.nanos();

        if collecting {
            let code = match &result {
                Ok(()) => ResultCode::SUCCESS,
                Err(failure) => failure.code,
            };
            self.trackers.record(Some(code), start, end);
        }
        Ok(())
    }

    fn reconnect(&mut self) {
        self.pool.shrink();
    }

    fn start_trackers(&mut self) {
        start_all(self.trackers.all_mut());
    }

    fn stop_trackers(&mut self) {
        stop_all(self.trackers.all_mut());
    }

    fn snapshots(&self) -> Vec<TrackerSnapshot> {
        self.trackers.snapshots()
    }

    fn close(&mut self) {
        self.pool.close();
    }
}
