//! Job behaviour against a scripted directory on a simulated clock.

use std::sync::Arc;
use std::time::Duration;

use ldaprate_core::{Clock, FixedRateBarrier, ManualClock, RateLimiter, SharedClock, Unlimited};
use ldaprate_jobs::client::{
    BindRequest, ConnectionFactory, ConnectionPool, Entry, LdapFailure, ModifyRequest, PoolRole,
    ResultCode, SearchFailure, SearchRequest, SearchResponse,
};
use ldaprate_jobs::trackers::TrackerContext;
use ldaprate_jobs::{
    definition_for, run_worker, Config, JobKind, JobResult, JobStatus, LoopSettings, StopSignal,
    WorkerContext, WorkerOutcome,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

const START_MILLIS: i64 = 1_700_000_000_000;

/// What every search issued against a [`ScriptedDirectory`] returns.
#[derive(Debug, Clone)]
enum SearchScript {
    Entries(Vec<Entry>),
    Fail(SearchFailure),
}

#[derive(Debug, Default)]
struct CallLog {
    searches: u64,
    binds: u64,
    modified_dns: Vec<String>,
    /// Searches completed when each shrink happened.
    shrinks_after_searches: Vec<u64>,
    shrunk_roles: Vec<PoolRole>,
    closed: u64,
}

/// A directory that answers from a script and costs a fixed simulated
/// latency per operation.
#[derive(Debug, Clone)]
struct ScriptedDirectory {
    clock: Arc<ManualClock>,
    latency: Duration,
    search: SearchScript,
    log: Arc<Mutex<CallLog>>,
}

impl ScriptedDirectory {
    fn new(clock: Arc<ManualClock>, search: SearchScript) -> Self {
        Self {
            clock,
            latency: Duration::from_millis(1),
            search,
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }
}

struct ScriptedPool {
    directory: ScriptedDirectory,
    role: PoolRole,
}

impl ConnectionPool for ScriptedPool {
    fn search(&mut self, _request: &SearchRequest) -> Result<SearchResponse, SearchFailure> {
        self.directory.clock.advance(self.directory.latency);
        self.directory.log.lock().searches += 1;
        match &self.directory.search {
            SearchScript::Entries(entries) => Ok(SearchResponse {
                entries: entries.clone(),
            }),
            SearchScript::Fail(failure) => Err(failure.clone()),
        }
    }

    fn bind(&mut self, _request: &BindRequest) -> Result<(), LdapFailure> {
        self.directory.clock.advance(self.directory.latency);
        self.directory.log.lock().binds += 1;
        Ok(())
    }

    fn modify(&mut self, request: &ModifyRequest) -> Result<(), LdapFailure> {
        self.directory.clock.advance(self.directory.latency);
        self.directory
            .log
            .lock()
            .modified_dns
            .push(request.dn.clone());
        Ok(())
    }

    fn shrink(&mut self) {
        let mut log = self.directory.log.lock();
        let searches = log.searches;
        log.shrinks_after_searches.push(searches);
        log.shrunk_roles.push(self.role);
    }

    fn close(&mut self) {
        self.directory.log.lock().closed += 1;
    }
}

impl ConnectionFactory for ScriptedDirectory {
    fn connect(&self, role: PoolRole) -> JobResult<Box<dyn ConnectionPool>> {
        Ok(Box::new(ScriptedPool {
            directory: self.clone(),
            role,
        }))
    }
}

/// Runs one worker of `config`'s job until the simulated clock has moved
/// `run_millis` past the start.
fn run_one(
    config: &Config,
    directory: &ScriptedDirectory,
    run_millis: i64,
    operations_between_reconnects: u64,
) -> WorkerOutcome {
    run_one_limited(
        config,
        directory,
        run_millis,
        operations_between_reconnects,
        &Unlimited,
    )
}

fn run_one_limited(
    config: &Config,
    directory: &ScriptedDirectory,
    run_millis: i64,
    operations_between_reconnects: u64,
    limiter: &dyn RateLimiter,
) -> WorkerOutcome {
    let definition = definition_for(config).unwrap();
    let clock: SharedClock = directory.clock.clone();
    let context = WorkerContext {
        thread_index: 0,
        thread_id: "thread-0".to_string(),
        clock: clock.clone(),
        rng: StdRng::seed_from_u64(42),
        trackers: TrackerContext {
            client_id: "test".to_string(),
            thread_id: "thread-0".to_string(),
            collection_interval_secs: 60,
            clock: clock.clone(),
            real_time: None,
        },
        factory: Arc::new(directory.clone()),
    };
    let mut worker = definition.create_worker(context).unwrap();

    let stop_at = clock.epoch_millis() + run_millis;
    let settings = LoopSettings {
        job_stop_millis: Some(stop_at),
        operations_between_reconnects,
        ..LoopSettings::default()
    };
    let stop = StopSignal::new(clock.clone()).with_stop_at(Some(stop_at));

    run_worker("thread-0", worker.as_mut(), &settings, limiter, &stop, &clock)
}

/// A barrier whose naps pass simulated time instead of sleeping.
#[derive(Debug)]
struct SimulatedNaps {
    barrier: FixedRateBarrier,
    clock: Arc<ManualClock>,
}

impl RateLimiter for SimulatedNaps {
    fn await_slot(&self) -> bool {
        let skip = self.barrier.await_slot();
        if skip {
            self.clock.advance(Duration::from_millis(1));
        }
        skip
    }
}

fn tracker<'a>(outcome: &'a WorkerOutcome, name: &str) -> &'a ldaprate_core::TrackerSnapshot {
    outcome
        .snapshots
        .iter()
        .find(|s| s.descriptor.display_name == name)
        .unwrap_or_else(|| panic!("no tracker named {name}"))
}

#[test]
fn test_search_and_bind_with_no_match_never_binds() {
    let clock = ManualClock::shared(START_MILLIS);
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(Vec::new()));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndBind;
    config.bind.password = Some("password".to_string());

    let outcome = run_one(&config, &directory, 10, 0);

    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.iterations, 10);
    let log = directory.log.lock();
    assert_eq!(log.searches, 10);
    assert_eq!(log.binds, 0);

    let bind_codes = tracker(&outcome, "Bind Result Codes");
    assert_eq!(bind_codes.category_count("94 (no results returned)"), 10);
    let search_codes = tracker(&outcome, "Search Result Codes");
    assert_eq!(search_codes.category_count("0 (success)"), 10);
    assert_eq!(
        tracker(&outcome, "Authentications Completed").data.total_count(),
        10
    );
    assert_eq!(
        tracker(&outcome, "Bind Duration (ms)").data.total_count(),
        0
    );
}

#[test]
fn test_search_and_bind_uses_the_password_attribute() {
    let clock = ManualClock::shared(START_MILLIS);
    let with_password = Entry::new("uid=user.1,ou=People,dc=example,dc=com")
        .with_attribute("userPassword", ["secret"]);
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(vec![with_password]));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndBind;
    config.bind.password_attribute = Some("userPassword".to_string());

    let outcome = run_one(&config, &directory, 10, 0);

    // Each authentication is a search and a bind, 2ms of simulated time.
    assert_eq!(outcome.iterations, 5);
    assert_eq!(directory.log.lock().binds, 5);
    assert_eq!(
        tracker(&outcome, "Bind Result Codes").category_count("0 (success)"),
        5
    );
    let authentication = tracker(&outcome, "Authentication Duration (ms)");
    assert_eq!(authentication.average_millis(), Some(2.0));
}

#[test]
fn test_entry_without_password_records_no_such_attribute() {
    let clock = ManualClock::shared(START_MILLIS);
    let bare = Entry::new("uid=user.1,ou=People,dc=example,dc=com");
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(vec![bare]));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndBind;
    config.bind.password_attribute = Some("userPassword".to_string());

    let outcome = run_one(&config, &directory, 4, 0);

    assert_eq!(directory.log.lock().binds, 0);
    assert_eq!(
        tracker(&outcome, "Bind Result Codes").category_count("16 (no such attribute)"),
        4
    );
}

#[test]
fn test_reconnects_every_fifth_iteration() {
    let clock = ManualClock::shared(START_MILLIS);
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(Vec::new()));
    let config = Config::default();

    let outcome = run_one(&config, &directory, 17, 5);

    assert_eq!(outcome.iterations, 17);
    assert_eq!(outcome.reconnects, 3);
    let log = directory.log.lock();
    assert_eq!(log.shrinks_after_searches, vec![4, 9, 14]);
    assert_eq!(log.closed, 1);
}

#[test]
fn test_combined_job_shrinks_both_pools() {
    let clock = ManualClock::shared(START_MILLIS);
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(Vec::new()));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndBind;
    config.bind.password = Some("password".to_string());

    let outcome = run_one(&config, &directory, 2, 2);

    assert_eq!(outcome.reconnects, 1);
    let log = directory.log.lock();
    assert_eq!(log.shrunk_roles, vec![PoolRole::Search, PoolRole::Bind]);
    assert_eq!(log.closed, 2);
}

#[test]
fn test_malformed_filter_stops_the_worker() {
    let clock = ManualClock::shared(START_MILLIS);
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(Vec::new()));
    let mut config = Config::default();
    config.search.filter1 = "(uid=user.[1-5]".to_string();

    let outcome = run_one(&config, &directory, 100, 0);

    assert_eq!(outcome.status, JobStatus::CompletedWithErrors);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(directory.log.lock().searches, 0);
    assert!(outcome.error.unwrap().contains("search filter"));
}

#[test]
fn test_search_and_modify_modifies_partial_results() {
    let clock = ManualClock::shared(START_MILLIS);
    let partial = vec![
        Entry::new("uid=user.1,ou=People,dc=example,dc=com"),
        Entry::new("uid=user.2,ou=People,dc=example,dc=com"),
    ];
    let failure = SearchFailure::new(ResultCode::SIZE_LIMIT_EXCEEDED, "too many")
        .with_partial_entries(partial);
    let directory = ScriptedDirectory::new(clock, SearchScript::Fail(failure));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndModify;

    // One search and two modifies per iteration.
    let outcome = run_one(&config, &directory, 9, 0);

    assert_eq!(outcome.iterations, 3);
    assert_eq!(directory.log.lock().modified_dns.len(), 6);
    assert_eq!(
        tracker(&outcome, "Result Codes").category_count("4 (size limit exceeded)"),
        3
    );
    assert_eq!(
        tracker(&outcome, "Modify Result Codes").category_count("0 (success)"),
        6
    );
    assert_eq!(
        tracker(&outcome, "Entries Returned per Search").data.total_count(),
        0
    );
}

#[test]
fn test_search_and_modify_counts_entries_returned() {
    let clock = ManualClock::shared(START_MILLIS);
    let entries = vec![
        Entry::new("uid=user.1,ou=People,dc=example,dc=com"),
        Entry::new("uid=user.2,ou=People,dc=example,dc=com"),
        Entry::new("uid=user.3,ou=People,dc=example,dc=com"),
    ];
    let directory = ScriptedDirectory::new(clock, SearchScript::Entries(entries));
    let mut config = Config::default();
    config.job.kind = JobKind::SearchAndModify;

    let outcome = run_one(&config, &directory, 8, 0);

    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        tracker(&outcome, "Entries Returned per Search").average_value(),
        Some(3.0)
    );
    assert_eq!(
        tracker(&outcome, "Modifies Completed").data.total_count(),
        6
    );
    assert_eq!(
        tracker(&outcome, "Modify Response Time Categories").category_count("Between 1ms and 2ms"),
        6
    );
}

#[test]
fn test_rate_barrier_spaces_iterations_on_simulated_time() {
    let clock = ManualClock::shared(START_MILLIS);
    let directory = ScriptedDirectory::new(clock.clone(), SearchScript::Entries(Vec::new()));
    let limiter = SimulatedNaps {
        barrier: FixedRateBarrier::new(Duration::from_secs(1), 100, clock.clone())
            .unwrap()
            .with_max_wait(Duration::ZERO),
        clock,
    };

    // Slots every 10ms; each search costs 1ms.
    let outcome = run_one_limited(&Config::default(), &directory, 100, 0, &limiter);

    assert_eq!(outcome.iterations, 10);
    assert_eq!(directory.log.lock().searches, 10);
    assert_eq!(
        tracker(&outcome, "Searches Completed").data.total_count(),
        10
    );
}
