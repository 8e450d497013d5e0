//! The seam between the generic runner and the individual job types.
//!
//! A [`JobDefinition`] is built once per run from validated configuration
//! and shared read-only by every worker thread. It describes its parameters
//! and trackers and creates one [`JobWorker`] per thread. The worker owns its
//! pools, generators, RNG and trackers, and performs exactly one iteration
//! of its operation plan per call.

use crate::client::ConnectionFactory;
use crate::error::JobResult;
use crate::trackers::TrackerContext;
use ldaprate_core::{SharedClock, TrackerDescriptor, TrackerSnapshot};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The job types this crate can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Bind,
    #[default]
    Search,
    Modify,
    SearchAndBind,
    SearchAndModify,
}

impl JobKind {
    pub const ALL: [Self; 5] = [
        Self::Bind,
        Self::Search,
        Self::Modify,
        Self::SearchAndBind,
        Self::SearchAndModify,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Search => "search",
            Self::Modify => "modify",
            Self::SearchAndBind => "search-and-bind",
            Self::SearchAndModify => "search-and-modify",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown job kind '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// One configurable setting of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    /// Configuration key, e.g. `search.filter1`.
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

impl ParameterSpec {
    #[must_use]
    pub const fn required(
        key: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            display_name,
            description,
            required: true,
            default: None,
        }
    }

    #[must_use]
    pub const fn optional(
        key: &'static str,
        display_name: &'static str,
        description: &'static str,
        default: Option<&'static str>,
    ) -> Self {
        Self {
            key,
            display_name,
            description,
            required: false,
            default,
        }
    }
}

/// Parameters every job accepts.
pub const COMMON_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::required("job.kind", "Job Kind", "The type of job to run."),
    ParameterSpec::optional(
        "job.threads",
        "Client Threads",
        "The number of worker threads issuing operations.",
        Some("1"),
    ),
    ParameterSpec::optional(
        "job.duration",
        "Duration",
        "How long the job runs, e.g. \"5m\". Unlimited when absent.",
        None,
    ),
    ParameterSpec::optional(
        "job.collection_interval_secs",
        "Statistics Collection Interval",
        "The length in seconds of each statistics collection interval.",
        Some("60"),
    ),
    ParameterSpec::optional(
        "job.warm_up",
        "Warm-Up Duration",
        "Time at the beginning of the job during which statistics are not collected.",
        None,
    ),
    ParameterSpec::optional(
        "job.cool_down",
        "Cool-Down Duration",
        "Time at the end of the job during which statistics are not collected. Requires a duration.",
        None,
    ),
    ParameterSpec::optional(
        "job.max_rate",
        "Max Operation Rate",
        "The maximum number of iterations per rate interval across all threads.",
        None,
    ),
    ParameterSpec::optional(
        "job.rate_interval",
        "Rate Limit Interval",
        "The interval over which the max rate applies.",
        Some("1s"),
    ),
    ParameterSpec::optional(
        "job.operations_between_reconnects",
        "Operations Between Reconnects",
        "Close and re-establish connections after this many iterations. 0 never reconnects.",
        Some("0"),
    ),
    ParameterSpec::optional(
        "job.seed",
        "Random Seed",
        "Seed for the parent random number generator, for reproducible runs.",
        None,
    ),
];

/// Everything a worker needs from the runner.
pub struct WorkerContext {
    pub thread_index: usize,
    pub thread_id: String,
    pub clock: SharedClock,
    pub rng: StdRng,
    pub trackers: TrackerContext,
    pub factory: Arc<dyn ConnectionFactory>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("thread_index", &self.thread_index)
            .field("thread_id", &self.thread_id)
            .field("trackers", &self.trackers)
            .finish_non_exhaustive()
    }
}

/// A runnable job type, built once from configuration.
pub trait JobDefinition: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Parameters this job accepts, including [`COMMON_PARAMETERS`].
    fn parameter_schema(&self) -> Vec<ParameterSpec>;

    /// Trackers each worker reports, obtainable before any worker exists.
    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor>;

    /// Creates the worker for one thread, opening its pools.
    ///
    /// # Errors
    ///
    /// Returns `JobError::UnableToRun` when a pool cannot be created.
    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>>;
}

/// One thread's share of a job.
pub trait JobWorker: Send {
    /// Performs one iteration of the operation plan.
    ///
    /// Outcomes are only recorded when `collecting` is true; the operations
    /// are issued either way.
    ///
    /// # Errors
    ///
    /// Returns `JobError::MalformedRequest` when a generated request is
    /// invalid. Protocol-level failures are recorded, not returned.
    fn run_iteration(&mut self, collecting: bool) -> JobResult<()>;

    /// Closes idle connections so the next operation reconnects.
    fn reconnect(&mut self);

    fn start_trackers(&mut self);

    fn stop_trackers(&mut self);

    fn snapshots(&self) -> Vec<TrackerSnapshot>;

    /// Releases the worker's connections.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trips_through_text() {
        for kind in JobKind::ALL {
            assert_eq!(kind.to_string().parse::<JobKind>(), Ok(kind));
        }
        assert_eq!("search_and_bind".parse::<JobKind>(), Ok(JobKind::SearchAndBind));
        assert!("compare".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_common_parameters_have_unique_keys() {
        let mut keys: Vec<&str> = COMMON_PARAMETERS.iter().map(|p| p.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), COMMON_PARAMETERS.len());
    }
}
