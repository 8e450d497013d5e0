//! Repeated simple binds with generated DNs.

use super::{PairGenerator, PatternPair};
use crate::client::{BindRequest, ConnectionPool, PoolRole, ResultCode};
use crate::config::Config;
use crate::error::{JobError, JobResult};
use crate::job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext};
use crate::trackers::{start_all, stop_all, OperationNames, OperationTrackers};
use ldaprate_core::{SharedClock, TrackerDescriptor, TrackerSnapshot, DEFAULT_CATEGORIZER_NAME};
use rand::rngs::StdRng;

pub(crate) const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "bind.dn",
        "Bind DN",
        "The DN to bind as. May be a value pattern.",
        Some("uid=user.[1-1000],ou=People,dc=example,dc=com"),
    ),
    ParameterSpec::optional(
        "bind.dn2",
        "Bind DN 2",
        "A second DN pattern, used for the binds that do not use the first.",
        None,
    ),
    ParameterSpec::optional(
        "bind.dn1_percent",
        "Bind DN 1 Percentage",
        "The percentage of binds that use the first DN pattern.",
        Some("100"),
    ),
    ParameterSpec::required("bind.password", "Bind Password", "The password to bind with."),
];

const NAMES: OperationNames = OperationNames {
    completed: Some("Binds Completed"),
    duration: "Bind Duration (ms)",
    result_codes: Some("Result Codes"),
    categories: DEFAULT_CATEGORIZER_NAME,
};

/// Binds as a generated DN with a static password.
///
/// The DN comes from `bind.dn`, or from `bind.dn2` for the share of binds
/// that `bind.dn1_percent` leaves over.
#[derive(Debug)]
pub struct BindJob {
    dns: PatternPair,
    password: String,
}

impl BindJob {
    /// # Errors
    ///
    /// Returns `JobError::InvalidParameter` for a bad DN pattern or a
    /// missing password.
    pub fn from_config(config: &Config) -> JobResult<Self> {
        let password = config
            .bind
            .password
            .clone()
            .ok_or_else(|| JobError::invalid_parameter("bind.password", "a password is required"))?;
        Ok(Self {
            dns: PatternPair::compile(
                ["bind.dn", "bind.dn2"],
                &config.bind.dn,
                config.bind.dn2.as_deref(),
                config.bind.dn1_percent,
            )?,
            password,
        })
    }
}

impl JobDefinition for BindJob {
    fn kind(&self) -> JobKind {
        JobKind::Bind
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        super::parameter_schema(JobKind::Bind)
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
        let pool = context.factory.connect(PoolRole::Bind)?;
        Ok(Box::new(BindWorker {
            dns: self.dns.generator(),
            password: self.password.clone(),
            pool,
            trackers: OperationTrackers::new(&NAMES, &context.trackers),
            clock: context.clock,
            rng: context.rng,
        }))
    }
}

struct BindWorker {
    dns: PairGenerator,
    password: String,
    pool: Box<dyn ConnectionPool>,
    trackers: OperationTrackers,
    clock: SharedClock,
    rng: StdRng,
}

impl JobWorker for BindWorker {
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
        let request = BindRequest {
            dn: self.dns.next_value(&mut self.rng),
            password: self.password.clone(),
        };

        let start = self.clock.nanos();
        let result = self.pool.bind(&request);
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
