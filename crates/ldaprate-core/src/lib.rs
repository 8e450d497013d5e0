//! Statistics core for ldaprate load-generation jobs.
//!
//! Latency bucketing, the warm-up/cool-down statistics window, operation
//! pacing and the interval-based trackers every job reports through.

pub mod categorizer;
pub mod clock;
pub mod duration;
pub mod error;
pub mod rate_limiter;
pub mod stats;
pub mod window;

pub use categorizer::{
    bucket_for_nanos, LatencyBucket, ResponseTimeCategorizer, DEFAULT_CATEGORIZER_NAME,
    LATENCY_BUCKETS,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use duration::{parse_duration, parse_optional_duration};
pub use error::{CoreError, CoreResult};
pub use rate_limiter::{FixedRateBarrier, RateLimiter, Unlimited};
pub use stats::{
    aggregate, CategoricalCounter, IncrementalTracker, IntegerValueTracker, RealTimeReporter,
    SnapshotData, StatTracker, TimeTracker, TrackerDescriptor, TrackerKind, TrackerSnapshot,
};
pub use window::{
    StatisticsWindowController, TrackerLifecycle, Transition, WindowConfig, WindowState,
};
