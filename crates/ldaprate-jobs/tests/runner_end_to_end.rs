//! Whole jobs run by the multi-threaded runner against the in-memory
//! directory.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ldaprate_core::{RealTimeReporter, SystemClock, TrackerDescriptor};
use ldaprate_jobs::{
    definition_for, Config, JobDefinition, JobKind, JobReport, JobResult, JobRunner, JobStatus,
    JobWorker, MemoryConnectionFactory, MemoryDirectory, ParameterSpec, PrometheusReporter,
    WorkerContext,
};

const BASE_DN: &str = "dc=example,dc=com";

fn directory(users: u32) -> Arc<MemoryDirectory> {
    let directory = Arc::new(MemoryDirectory::new());
    directory.populate_users(BASE_DN, users, "password");
    directory
}

/// Runs `config` for `run_for`, stopping it from another thread.
fn run_for(
    config: &Config,
    directory: &Arc<MemoryDirectory>,
    run_for: Duration,
    reporter: Option<Arc<dyn RealTimeReporter>>,
) -> JobReport {
    config.validate().unwrap();
    let settings = config.run_settings().unwrap();
    let definition = definition_for(config).unwrap();
    let factory = Arc::new(MemoryConnectionFactory::new(directory.clone()));

    let runner = JobRunner::new(SystemClock::shared());
    let stop = runner.stop_signal();
    let stopper = thread::spawn(move || {
        thread::sleep(run_for);
        stop.request();
    });

    let report = runner.run(definition, &settings, factory, reporter).unwrap();
    stopper.join().unwrap();
    report
}

#[test]
fn test_search_and_bind_authenticates_generated_users() {
    let directory = directory(100);
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndBind;
    config.job.threads = 2;
    config.job.seed = Some(7);
    config.search.filter1 = "(uid=user.[1-100])".to_string();
    config.bind.password_attribute = Some("userPassword".to_string());

    let report = run_for(&config, &directory, Duration::from_millis(200), None);

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.threads.len(), 2);
    let iterations = report.total_iterations();
    assert!(iterations > 0);

    let authentications = report.tracker("Authentications Completed").unwrap();
    assert_eq!(authentications.data.total_count(), iterations);
    let bind_codes = report.tracker("Bind Result Codes").unwrap();
    assert_eq!(bind_codes.category_count("0 (success)"), iterations);
    assert_eq!(directory.counts().binds, iterations);
}

#[test]
fn test_modify_job_changes_entries() {
    let directory = directory(10);
    let mut config = Config::default();
    config.job.kind = JobKind::Modify;
    config.modify.dn = "uid=user.[1-10],ou=People,dc=example,dc=com".to_string();
    config.modify.attributes = vec!["description".to_string()];
    config.modify.value_length = 12;

    let report = run_for(&config, &directory, Duration::from_millis(100), None);

    assert_eq!(report.status, JobStatus::Completed);
    let codes = report.tracker("Result Codes").unwrap();
    assert_eq!(codes.category_count("0 (success)"), report.total_iterations());

    let modified = (1..=10)
        .filter_map(|n| directory.get(&format!("uid=user.{n},ou=People,{BASE_DN}")))
        .filter(|entry| entry.has_attribute("description"))
        .count();
    assert!(modified > 0);
}

#[test]
fn test_bind_job_counts_invalid_credentials() {
    let directory = directory(5);
    let mut config = Config::default();
    config.job.kind = JobKind::Bind;
    config.bind.dn = "uid=user.[1-5],ou=People,dc=example,dc=com".to_string();
    config.bind.password = Some("wrong".to_string());

    let report = run_for(&config, &directory, Duration::from_millis(100), None);

    assert_eq!(report.status, JobStatus::Completed);
    let codes = report.tracker("Result Codes").unwrap();
    assert_eq!(
        codes.category_count("49 (invalid credentials)"),
        report.total_iterations()
    );
}

#[test]
fn test_max_rate_is_shared_by_every_thread() {
    let directory = directory(10);
    let mut config = Config::default();
    config.job.threads = 3;
    config.job.max_rate = Some(1);
    config.search.filter1 = "(uid=user.[1-10])".to_string();

    let report = run_for(&config, &directory, Duration::from_millis(200), None);

    // The second slot is a full second after the first.
    let iterations = report.total_iterations();
    assert!((1..=2).contains(&iterations), "{iterations} iterations ran");
}

#[test]
fn test_unknown_base_is_counted_not_fatal() {
    let directory = directory(5);
    let mut config = Config::default();
    config.search.base_dn = "ou=Missing,dc=example,dc=com".to_string();

    let report = run_for(&config, &directory, Duration::from_millis(50), None);

    assert_eq!(report.status, JobStatus::Completed);
    let codes = report.tracker("Result Codes").unwrap();
    assert_eq!(
        codes.category_count("32 (no such object)"),
        report.total_iterations()
    );
    assert!(report.tracker("Entries Returned per Search").is_some());
}

#[test]
fn test_real_time_reporter_receives_observations() {
    let directory = directory(10);
    let mut config = Config::default();
    config.search.filter1 = "(uid=user.[1-10])".to_string();
    let reporter = Arc::new(PrometheusReporter::new().unwrap());

    let report = run_for(
        &config,
        &directory,
        Duration::from_millis(50),
        Some(reporter.clone()),
    );

    assert!(report.total_iterations() > 0);
    let rendered = reporter.render();
    assert!(rendered.contains("ldaprate_realtime_count_total"));
    assert!(rendered.contains("Searches Completed"));
}

#[test]
fn test_report_serializes_to_json() {
    let directory = directory(3);
    let mut config = Config::default();
    config.search.filter1 = "(uid=user.[1-3])".to_string();

    let report = run_for(&config, &directory, Duration::from_millis(30), None);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["kind"], "search");
    assert_eq!(json["status"], "completed");
    assert!(json["trackers"].as_array().is_some_and(|t| !t.is_empty()));
}

/// Gives thread 0 a definition whose filter never parses and every other
/// thread a working one.
struct BrokenFirstThread {
    broken: Arc<dyn JobDefinition>,
    healthy: Arc<dyn JobDefinition>,
}

impl JobDefinition for BrokenFirstThread {
    fn kind(&self) -> JobKind {
        self.healthy.kind()
    }

    fn parameter_schema(&self) -> Vec<ParameterSpec> {
        self.healthy.parameter_schema()
    }

    fn tracker_schema(
        &self,
        client_id: &str,
        thread_id: &str,
        interval_secs: u32,
    ) -> Vec<TrackerDescriptor> {
        self.healthy.tracker_schema(client_id, thread_id, interval_secs)
    }

    fn create_worker(&self, context: WorkerContext) -> JobResult<Box<dyn JobWorker>> {
        if context.thread_index == 0 {
            self.broken.create_worker(context)
        } else {
            self.healthy.create_worker(context)
        }
    }
}

#[test]
fn test_fatal_error_ends_only_its_own_thread() {
    let directory = directory(10);
    let mut config = Config::default();
    config.job.threads = 3;
    config.search.filter1 = "(uid=user.[1-10])".to_string();
    config.validate().unwrap();
    let mut broken = config.clone();
    broken.search.filter1 = "(uid=user.[1-10]".to_string();

    let definition = Arc::new(BrokenFirstThread {
        broken: definition_for(&broken).unwrap(),
        healthy: definition_for(&config).unwrap(),
    });
    let settings = config.run_settings().unwrap();
    let factory = Arc::new(MemoryConnectionFactory::new(directory.clone()));
    let runner = JobRunner::new(SystemClock::shared());
    let stop = runner.stop_signal();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        stop.request();
    });

    let report = runner.run(definition, &settings, factory, None).unwrap();
    stopper.join().unwrap();

    assert_eq!(report.status, JobStatus::CompletedWithErrors);
    let failed = &report.threads[0];
    assert_eq!(failed.status, JobStatus::CompletedWithErrors);
    assert_eq!(failed.iterations, 1);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("search filter")));

    for survivor in &report.threads[1..] {
        assert_eq!(survivor.status, JobStatus::Completed);
        assert!(survivor.error.is_none());
        assert!(survivor.iterations > 0);
    }
    let searches = report.tracker("Searches Completed").unwrap();
    assert!(searches.data.total_count() > 0);
    assert_eq!(directory.counts().searches, report.total_iterations() - 1);
}
