//! Authentication as a search for the user entry followed by a bind as it.
//!
//! The search and bind steps use separate pools. An iteration whose search
//! fails, finds nothing, or finds an entry without a password never binds;
//! the authentication as a whole is still timed and counted.

use super::{SearchGenerator, SearchTemplate};
use crate::client::{BindRequest, ConnectionPool, Entry, PoolRole, ResultCode};
use crate::config::Config;
use crate::error::{JobError, JobResult};
use crate::job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext};
use crate::trackers::{start_all, stop_all, OperationNames, OperationTrackers};
use ldaprate_core::{SharedClock, StatTracker, TrackerDescriptor, TrackerSnapshot};
use rand::rngs::StdRng;

pub(crate) const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "bind.password",
        "Bind Password",
        "The password for every user. Exclusive with the password attribute.",
        None,
    ),
    ParameterSpec::optional(
        "bind.password_attribute",
        "Password Attribute",
        "The attribute of the found entry holding its clear-text password.",
        None,
    ),
];

const AUTHENTICATION: OperationNames = OperationNames {
    completed: Some("Authentications Completed"),
    duration: "Authentication Duration (ms)",
    result_codes: None,
    categories: "Authentication Response Time Categories",
};

const SEARCH: OperationNames = OperationNames {
    completed: None,
    duration: "Search Duration (ms)",
    result_codes: Some("Search Result Codes"),
    categories: "Search Response Time Categories",
};

const BIND: OperationNames = OperationNames {
    completed: None,
    duration: "Bind Duration (ms)",
    result_codes: Some("Bind Result Codes"),
    categories: "Bind Response Time Categories",
};

/// Where the bind password comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PasswordSource {
    Static(String),
    Attribute(String),
}

impl PasswordSource {
    fn password_for(&self, entry: &Entry) -> Option<String> {
        match self {
            Self::Static(password) => Some(password.clone()),
            Self::Attribute(attribute) => entry.first_value(attribute).map(str::to_string),
        }
    }
}

/// Finds a user with a search, then binds as that user.
#[derive(Debug)]
pub struct SearchAndBindJob {
    search: SearchTemplate,
    password: PasswordSource,
}

impl SearchAndBindJob {
    /// # Errors
    ///
    /// Returns `JobError::InvalidParameter` for a pattern that does not
    /// compile or an ambiguous password source.
    pub fn from_config(config: &Config) -> JobResult<Self> {
        let password = match (&config.bind.password, &config.bind.password_attribute) {
            (Some(password), None) => PasswordSource::Static(password.clone()),
            (None, Some(attribute)) => PasswordSource::Attribute(attribute.clone()),
            _ => {
                return Err(JobError::invalid_parameter(
                    "bind.password",
                    "exactly one of bind.password and bind.password_attribute is required",
                ))
            }
        };
        let requested = match &password {
            PasswordSource::Static(_) => "1.1".to_string(),
            PasswordSource::Attribute(attribute) => attribute.clone(),
        };

        Ok(Self {
            search: SearchTemplate::from_config(&config.search)?.restricted(vec![requested], 1),
            password,
        })
    }
}

impl JobDefinition for SearchAndBindJob {
    fn kind(&self) -> JobKind {
        JobKind::SearchAndBind
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        super::parameter_schema(JobKind::SearchAndBind)
    }

    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        [AUTHENTICATION, SEARCH, BIND]
            .iter()
            .flat_map(|names| names.descriptors(client_id, thread_id, interval_secs))
            .collect()
    }

    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>> {
        let search_pool = context.factory.connect(PoolRole::Search)?;
        let bind_pool = context.factory.connect(PoolRole::Bind)?;
        Ok(Box::new(SearchAndBindWorker {
            search: self.search.generator(),
            password: self.password.clone(),
            search_pool,
            bind_pool,
            authentication: OperationTrackers::new(&AUTHENTICATION, &context.trackers),
            search_trackers: OperationTrackers::new(&SEARCH, &context.trackers),
            bind_trackers: OperationTrackers::new(&BIND, &context.trackers),
            clock: context.clock,
            rng: context.rng,
        }))
    }
}

struct SearchAndBindWorker {
    search: SearchGenerator,
    password: PasswordSource,
    search_pool: Box<dyn ConnectionPool>,
    bind_pool: Box<dyn ConnectionPool>,
    authentication: OperationTrackers,
    search_trackers: OperationTrackers,
    bind_trackers: OperationTrackers,
    clock: SharedClock,
    rng: StdRng,
}

impl SearchAndBindWorker {
    fn all_trackers(&mut self) -> Vec<&mut dyn StatTracker> {
        let mut all = self.authentication.all_mut();
        all.extend(self.search_trackers.all_mut());
        all.extend(self.bind_trackers.all_mut());
        all
    }

    /// Binds as the first entry found, returning when the bind finished.
    fn bind_step(&mut self, entries: &[Entry], collecting: bool) -> i64 {
        let Some(entry) = entries.first() else {
            if collecting {
                self.bind_trackers.record_code(ResultCode::NO_RESULTS_RETURNED);
            }
            return self.clock.nanos();
        };
        let Some(password) = self.password.password_for(entry) else {
            if collecting {
                self.bind_trackers.record_code(ResultCode::NO_SUCH_ATTRIBUTE);
            }
            return self.clock.nanos();
        };

        let request = BindRequest {
            dn: entry.dn.clone(),
            password,
        };
        let start = self.clock.nanos();
        let result = self.bind_pool.bind(&request);
        let end = self.clock.nanos();
        if collecting {
            let code = match &result {
                Ok(()) => ResultCode::SUCCESS,
                Err(failure) => failure.code,
            };
            self.bind_trackers.record(Some(code), start, end);
        }
        end
    }
}

impl JobWorker for SearchAndBindWorker {
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()> {
        let request = self.search.next_request(&mut self.rng)?;

        let start = self.clock.nanos();
        let result = self.search_pool.search(&request);
        let search_end = self.clock.nanos();

        let end = match result {
            Ok(response) => {
                if collecting {
                    self.search_trackers
                        .record(Some(ResultCode::SUCCESS), start, search_end);
                }
                self.bind_step(&response.entries, collecting)
            }
            Err(failure) => {
                if collecting {
                    self.search_trackers
                        .record(Some(failure.failure.code), start, search_end);
                }
                search_end
            }
        };

        if collecting {
            self.authentication.record(None, start, end);
        }
        Ok(())
    }

    fn reconnect(&mut self) {
        self.search_pool.shrink();
        self.bind_pool.shrink();
    }

    fn start_trackers(&mut self) {
        start_all(self.all_trackers());
    }

    fn stop_trackers(&mut self) {
        stop_all(self.all_trackers());
    }

    fn snapshots(&self) -> Vec<TrackerSnapshot> {
        let mut snapshots = self.authentication.snapshots();
        snapshots.extend(self.search_trackers.snapshots());
        snapshots.extend(self.bind_trackers.snapshots());
        snapshots
    }

    fn close(&mut self) {
        self.search_pool.close();
        self.bind_pool.close();
    }
}
