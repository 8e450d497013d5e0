//! Multi-threaded job execution.
//!
//! The runner builds every worker up front, so a connection failure aborts
//! the job before any load is generated, then runs one OS thread per worker
//! and merges the per-thread tracker snapshots into a [`JobReport`].

use crate::client::ConnectionFactory;
use crate::error::{JobError, JobResult};
use crate::job::{JobDefinition, JobKind, JobWorker, WorkerContext};
use crate::trackers::TrackerContext;
use crate::worker::{run_worker, JobStatus, LoopSettings, StopSignal, WorkerOutcome};
use chrono::{DateTime, Utc};
use ldaprate_core::{
    aggregate, FixedRateBarrier, RateLimiter, RealTimeReporter, SharedClock, TrackerSnapshot,
    Unlimited, WindowConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Typed run settings, produced from validated configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub threads: usize,
    /// `None` runs until a stop is requested.
    pub duration: Option<Duration>,
    pub collection_interval_secs: u32,
    pub window: WindowConfig,
    /// Iterations per `rate_interval` across all threads.
    pub max_rate: Option<u32>,
    pub rate_interval: Duration,
    pub operations_between_reconnects: u64,
    pub seed: Option<u64>,
    pub client_id: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            duration: None,
            collection_interval_secs: 60,
            window: WindowConfig::default(),
            max_rate: None,
            rate_interval: Duration::from_secs(1),
            operations_between_reconnects: 0,
            seed: None,
            client_id: "ldaprate".to_string(),
        }
    }
}

/// Outcome of one worker thread.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadReport {
    pub thread_id: String,
    pub status: JobStatus,
    pub iterations: u64,
    pub reconnects: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a finished job produced.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub threads: Vec<ThreadReport>,
    /// Aggregated trackers, in the order the first thread reported them.
    pub trackers: Vec<TrackerSnapshot>,
}

impl JobReport {
    /// The aggregated tracker named `name`.
    #[must_use]
    pub fn tracker(&self, name: &str) -> Option<&TrackerSnapshot> {
        self.trackers
            .iter()
            .find(|t| t.descriptor.display_name == name)
    }

    /// Iterations across all threads.
    #[must_use]
    pub fn total_iterations(&self) -> u64 {
        self.threads.iter().map(|t| t.iterations).sum()
    }
}

/// Runs job definitions across worker threads.
#[derive(Debug)]
pub struct JobRunner {
    clock: SharedClock,
    stop: StopSignal,
}

impl JobRunner {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        let stop = StopSignal::new(clock.clone());
        Self { clock, stop }
    }

    /// A handle that stops a running job from another thread.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs `definition` to completion.
    ///
    /// # Errors
    ///
    /// Returns `JobError::UnableToRun` when a worker cannot be created or
    /// spawned, and `JobError::Core` for invalid rate settings.
    pub fn run(
        &self,
        definition: Arc<dyn JobDefinition>,
        settings: &RunSettings,
        factory: Arc<dyn ConnectionFactory>,
        reporter: Option<Arc<dyn RealTimeReporter>>,
    ) -> JobResult<JobReport> {
        let job_id = Uuid::new_v4();
        let kind = definition.kind();
        let started_millis = self.clock.epoch_millis();
        let job_stop_millis = settings.duration.map(|duration| {
            let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
            started_millis.saturating_add(millis)
        });

        let limiter: Arc<dyn RateLimiter> = match settings.max_rate {
            Some(rate) => Arc::new(FixedRateBarrier::new(
                settings.rate_interval,
                rate,
                self.clock.clone(),
            )?),
            None => Arc::new(Unlimited),
        };

        let workers = self.build_workers(&definition, settings, &factory, reporter, job_id)?;

        info!(
            %job_id,
            %kind,
            threads = workers.len(),
            ?job_stop_millis,
            "job started"
        );

        let loop_settings = LoopSettings {
            window: settings.window,
            job_stop_millis,
            operations_between_reconnects: settings.operations_between_reconnects,
        };
        let stop = self.stop.clone().with_stop_at(job_stop_millis);
        let outcomes = self.run_workers(workers, &loop_settings, &limiter, &stop)?;

        let status = if outcomes
            .iter()
            .any(|o| o.status == JobStatus::CompletedWithErrors)
        {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };
        let trackers = aggregate_by_name(&outcomes)?;
        let threads: Vec<ThreadReport> = outcomes
            .into_iter()
            .map(|o| ThreadReport {
                thread_id: o.thread_id,
                status: o.status,
                iterations: o.iterations,
                reconnects: o.reconnects,
                error: o.error,
            })
            .collect();

        let report = JobReport {
            job_id,
            kind,
            status,
            started_at: timestamp(started_millis),
            stopped_at: timestamp(self.clock.epoch_millis()),
            threads,
            trackers,
        };
        info!(
            %job_id,
            %status,
            iterations = report.total_iterations(),
            "job finished"
        );
        Ok(report)
    }

    fn build_workers(
        &self,
        definition: &Arc<dyn JobDefinition>,
        settings: &RunSettings,
        factory: &Arc<dyn ConnectionFactory>,
        reporter: Option<Arc<dyn RealTimeReporter>>,
        job_id: Uuid,
    ) -> JobResult<Vec<(String, Box<dyn JobWorker>)>> {
        let mut parent = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let real_time = reporter.map(|reporter| (reporter, job_id.to_string()));

        let mut workers = Vec::with_capacity(settings.threads);
        for thread_index in 0..settings.threads {
            let thread_id = format!("thread-{thread_index}");
            let context = WorkerContext {
                thread_index,
                thread_id: thread_id.clone(),
                clock: self.clock.clone(),
                rng: StdRng::seed_from_u64(parent.gen()),
                trackers: TrackerContext {
                    client_id: settings.client_id.clone(),
                    thread_id: thread_id.clone(),
                    collection_interval_secs: settings.collection_interval_secs,
                    clock: self.clock.clone(),
                    real_time: real_time.clone(),
                },
                factory: factory.clone(),
            };
            match definition.create_worker(context) {
                Ok(worker) => workers.push((thread_id, worker)),
                Err(err) => {
                    warn!(%thread_id, built = workers.len(), "worker creation failed: {err}");
                    for (_, worker) in &mut workers {
                        worker.close();
                    }
                    return Err(match err {
                        JobError::UnableToRun(_) => err,
                        other => JobError::unable_to_run(format!("{thread_id}: {other}")),
                    });
                }
            }
        }
        Ok(workers)
    }

    fn run_workers(
        &self,
        workers: Vec<(String, Box<dyn JobWorker>)>,
        settings: &LoopSettings,
        limiter: &Arc<dyn RateLimiter>,
        stop: &StopSignal,
    ) -> JobResult<Vec<WorkerOutcome>> {
        let mut handles = Vec::with_capacity(workers.len());
        for (index, (thread_id, mut worker)) in workers.into_iter().enumerate() {
            let settings = settings.clone();
            let limiter = limiter.clone();
            let worker_stop = stop.clone();
            let clock = self.clock.clone();
            let name = thread_id.clone();
            let spawned = thread::Builder::new()
                .name(format!("ldaprate-worker-{index}"))
                .spawn(move || {
                    run_worker(
                        &name,
                        worker.as_mut(),
                        &settings,
                        limiter.as_ref(),
                        &worker_stop,
                        &clock,
                    )
                });
            match spawned {
                Ok(handle) => handles.push((thread_id, handle)),
                Err(err) => {
                    stop.request();
                    for (joined_id, handle) in handles {
                        if handle.join().is_err() {
                            let panicked = JobError::WorkerPanicked(joined_id.clone());
                            warn!(thread_id = %joined_id, "{panicked}");
                        }
                    }
                    return Err(JobError::unable_to_run(format!(
                        "failed to spawn {thread_id}: {err}"
                    )));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (thread_id, handle) in handles {
            match handle.join() {
                Ok(outcome) => outcomes.push(outcome),
                Err(_) => {
                    let err = JobError::WorkerPanicked(thread_id.clone());
                    warn!(%thread_id, "{err}");
                    outcomes.push(WorkerOutcome {
                        thread_id,
                        status: JobStatus::CompletedWithErrors,
                        iterations: 0,
                        reconnects: 0,
                        error: Some(err.to_string()),
                        snapshots: Vec::new(),
                    });
                }
            }
        }
        Ok(outcomes)
    }
}

/// Merges snapshots that share a display name, in first-seen order.
fn aggregate_by_name(outcomes: &[WorkerOutcome]) -> JobResult<Vec<TrackerSnapshot>> {
    let mut groups: Vec<(String, Vec<TrackerSnapshot>)> = Vec::new();
    for snapshot in outcomes.iter().flat_map(|o| o.snapshots.iter()) {
        let name = &snapshot.descriptor.display_name;
        match groups.iter_mut().find(|(n, _)| n == name) {
            Some((_, group)) => group.push(snapshot.clone()),
            None => groups.push((name.clone(), vec![snapshot.clone()])),
        }
    }

    groups
        .iter()
        .map(|(_, group)| aggregate(group).map_err(JobError::from))
        .collect()
}

fn timestamp(epoch_millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis).unwrap_or_else(Utc::now)
}
