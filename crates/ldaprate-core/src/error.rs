use thiserror::Error;

/// Canonical error type for the statistics core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A duration string could not be parsed.
    #[error("unable to parse `{input}` as a duration: {reason}")]
    InvalidDuration {
        /// The original text.
        input: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A pacing setting is out of range.
    #[error("invalid rate limit: {0}")]
    InvalidRate(String),

    /// Tracker snapshots that cannot be merged together.
    #[error("cannot aggregate trackers: {0}")]
    Aggregation(String),
}

impl CoreError {
    /// Creates an `InvalidDuration` variant.
    #[must_use]
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
