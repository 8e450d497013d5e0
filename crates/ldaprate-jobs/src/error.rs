use crate::config::ConfigError;
use ldaprate_core::CoreError;
use thiserror::Error;

/// Canonical error type for job setup and execution.
///
/// Protocol-level failures reported by the directory are not errors; they
/// are counted as outcomes. These variants cover what stops a worker or a
/// whole job.
#[derive(Debug, Error)]
pub enum JobError {
    /// A generated request could not be built. Fatal to the worker thread.
    #[error("generated invalid {what} '{value}': {reason}")]
    MalformedRequest {
        /// What was being generated, e.g. "search filter".
        what: &'static str,
        /// The generated text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The job cannot start, e.g. a connection could not be established.
    #[error("unable to run job: {0}")]
    UnableToRun(String),

    /// A job parameter has an unusable value.
    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A worker thread panicked.
    #[error("worker thread {0} panicked")]
    WorkerPanicked(String),

    /// Error from the statistics core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration loading or validation error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Metric registration error.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl JobError {
    /// Creates a `MalformedRequest` variant.
    #[must_use]
    pub fn malformed(
        what: &'static str,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::MalformedRequest {
            what,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `UnableToRun` variant.
    #[must_use]
    pub fn unable_to_run(message: impl Into<String>) -> Self {
        Self::UnableToRun(message.into())
    }

    /// Creates an `InvalidParameter` variant.
    #[must_use]
    pub fn invalid_parameter(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenient result alias for job operations.
pub type JobResult<T> = Result<T, JobError>;
