//! LDAP load-generation jobs for ldaprate.
//!
//! Bind, search, modify, search-and-bind and search-and-modify jobs driven
//! by one rate-limited worker loop per thread.

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod job;
pub mod jobs;
pub mod memory;
pub mod metrics;
pub mod runner;
pub mod trackers;
pub mod value;
pub mod worker;

pub use client::{
    BindRequest, ConnectionFactory, ConnectionPool, Entry, LdapFailure, Modification,
    ModifyRequest, PoolRole, ResultCode, SearchFailure, SearchRequest, SearchResponse,
    SearchScope,
};
pub use config::{Config, ConfigError, DEFAULT_CONFIG_FILE};
pub use error::{JobError, JobResult};
pub use job::{JobDefinition, JobKind, JobWorker, ParameterSpec, WorkerContext, COMMON_PARAMETERS};
pub use jobs::{
    definition_for, parameter_schema, BindJob, ModifyJob, SearchAndBindJob, SearchAndModifyJob,
    SearchJob,
};
pub use memory::{MemoryConnectionFactory, MemoryDirectory, OperationCounts};
pub use metrics::PrometheusReporter;
pub use runner::{JobReport, JobRunner, RunSettings, ThreadReport};
pub use worker::{run_worker, JobStatus, LoopSettings, StopSignal, WorkerOutcome};
