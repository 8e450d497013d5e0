//! Interval-based statistics trackers.
//!
//! Every tracker follows the same two-phase shape:
//!
//! 1. A [`TrackerDescriptor`] describes the tracker before a run starts, so a
//!    reporting system can pre-register it without a live instance.
//! 2. A live tracker (for example [`CategoricalCounter`]) is created per
//!    worker thread, started and stopped by the statistics window, updated
//!    on the hot path and finally turned into a [`TrackerSnapshot`].
//!
//! Updates made while a tracker is not running are ignored.

pub mod categorical;
pub mod incremental;
mod series;
pub mod snapshot;
pub mod time;
pub mod value;

pub use categorical::CategoricalCounter;
pub use incremental::IncrementalTracker;
pub use snapshot::{aggregate, SnapshotData, TimeInterval, TrackerSnapshot, ValueInterval};
pub use time::TimeTracker;
pub use value::IntegerValueTracker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default length of a collection interval in seconds.
pub const DEFAULT_COLLECTION_INTERVAL_SECS: u32 = 60;

/// The statistic a tracker maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Occurrence counts per category label.
    Categorical,
    /// Operation durations.
    Time,
    /// Occurrence counts.
    Incremental,
    /// Integer samples.
    IntegerValue,
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Categorical => "categorical",
            Self::Time => "time",
            Self::Incremental => "incremental",
            Self::IntegerValue => "integer value",
        };
        f.write_str(name)
    }
}

/// Registration-time description of a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerDescriptor {
    /// Display name, unique within a job.
    pub display_name: String,
    /// What the tracker measures.
    pub kind: TrackerKind,
    /// Client that owns the tracker.
    pub client_id: String,
    /// Worker thread that owns the tracker.
    pub thread_id: String,
    /// Collection interval length in seconds.
    pub collection_interval_secs: u32,
}

impl TrackerDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        kind: TrackerKind,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            kind,
            client_id: client_id.into(),
            thread_id: thread_id.into(),
            collection_interval_secs,
        }
    }

    /// Collection interval length in milliseconds.
    #[must_use]
    pub fn interval_millis(&self) -> i64 {
        i64::from(self.collection_interval_secs.max(1)) * 1_000
    }
}

/// Lifecycle shared by every live tracker.
pub trait StatTracker: Send {
    /// The tracker's registration-time description.
    fn descriptor(&self) -> &TrackerDescriptor;

    /// Resets all state and begins collecting.
    fn start(&mut self);

    /// Stops collecting and closes the last complete interval.
    fn stop(&mut self);

    /// Whether updates are currently being recorded.
    fn is_running(&self) -> bool;

    /// Captures the collected data.
    fn snapshot(&self) -> TrackerSnapshot;
}

/// Receives statistics as they are recorded, in addition to the end-of-run
/// snapshot.
pub trait RealTimeReporter: Send + Sync {
    /// Records one observation for `tracker`.
    fn report(&self, job_id: &str, tracker: &TrackerDescriptor, value: f64);
}

/// A tracker's connection to a [`RealTimeReporter`].
#[derive(Clone)]
pub(crate) struct RealTimeHook {
    reporter: Arc<dyn RealTimeReporter>,
    job_id: String,
}

impl RealTimeHook {
    pub(crate) fn new(reporter: Arc<dyn RealTimeReporter>, job_id: impl Into<String>) -> Self {
        Self {
            reporter,
            job_id: job_id.into(),
        }
    }

    pub(crate) fn report(&self, tracker: &TrackerDescriptor, value: f64) {
        self.reporter.report(&self.job_id, tracker, value);
    }
}

impl fmt::Debug for RealTimeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealTimeHook")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}
