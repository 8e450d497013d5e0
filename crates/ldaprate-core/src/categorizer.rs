//! Latency bucketing.
//!
//! Elapsed time is compared against an ascending table of boundaries with
//! strict less-than semantics: a duration of exactly `b` nanoseconds lands in
//! the bucket that starts at `b`. Anything at or beyond 60 s lands in the
//! unbounded last bucket.

use crate::clock::SharedClock;
use crate::stats::{CategoricalCounter, StatTracker, TrackerDescriptor, TrackerSnapshot};
use serde::Serialize;
use std::time::Duration;

/// Default tracker name for a categorizer.
pub const DEFAULT_CATEGORIZER_NAME: &str = "Response Time Categories";

const MS: u64 = 1_000_000;
const S: u64 = 1_000_000_000;

/// One latency range `[lower_nanos, upper_nanos)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    /// Category label recorded for durations in this range.
    pub label: &'static str,
    /// Inclusive lower bound.
    pub lower_nanos: u64,
    /// Exclusive upper bound, `None` for the last bucket.
    pub upper_nanos: Option<u64>,
}

const fn bucket(label: &'static str, lower_nanos: u64, upper_nanos: u64) -> LatencyBucket {
    LatencyBucket {
        label,
        lower_nanos,
        upper_nanos: Some(upper_nanos),
    }
}

/// Every latency bucket, shortest first.
///
/// Labels name each bucket's real bounds. The 2s to 3s bucket is therefore
/// "Between 2s and 3s", where SLAMD reports "Between 2s and 2s".
pub const LATENCY_BUCKETS: [LatencyBucket; 25] = [
    bucket("Less Than 1ms", 0, MS),
    bucket("Between 1ms and 2ms", MS, 2 * MS),
    bucket("Between 2ms and 3ms", 2 * MS, 3 * MS),
    bucket("Between 3ms and 4ms", 3 * MS, 4 * MS),
    bucket("Between 4ms and 5ms", 4 * MS, 5 * MS),
    bucket("Between 5ms and 10ms", 5 * MS, 10 * MS),
    bucket("Between 10ms and 20ms", 10 * MS, 20 * MS),
    bucket("Between 20ms and 30ms", 20 * MS, 30 * MS),
    bucket("Between 30ms and 40ms", 30 * MS, 40 * MS),
    bucket("Between 40ms and 50ms", 40 * MS, 50 * MS),
    bucket("Between 50ms and 100ms", 50 * MS, 100 * MS),
    bucket("Between 100ms and 200ms", 100 * MS, 200 * MS),
    bucket("Between 200ms and 300ms", 200 * MS, 300 * MS),
    bucket("Between 300ms and 400ms", 300 * MS, 400 * MS),
    bucket("Between 400ms and 500ms", 400 * MS, 500 * MS),
    bucket("Between 500ms and 1s", 500 * MS, S),
    bucket("Between 1s and 2s", S, 2 * S),
    bucket("Between 2s and 3s", 2 * S, 3 * S),
    bucket("Between 3s and 4s", 3 * S, 4 * S),
    bucket("Between 4s and 5s", 4 * S, 5 * S),
    bucket("Between 5s and 10s", 5 * S, 10 * S),
    bucket("Between 10s and 20s", 10 * S, 20 * S),
    bucket("Between 20s and 30s", 20 * S, 30 * S),
    bucket("Between 30s and 60s", 30 * S, 60 * S),
    LatencyBucket {
        label: "Longer Than 60s",
        lower_nanos: 60 * S,
        upper_nanos: None,
    },
];

// Upper bounds of every bucket, the last one unbounded.
const BOUNDARIES: [i64; 25] = [
    MS as i64,
    2 * MS as i64,
    3 * MS as i64,
    4 * MS as i64,
    5 * MS as i64,
    10 * MS as i64,
    20 * MS as i64,
    30 * MS as i64,
    40 * MS as i64,
    50 * MS as i64,
    100 * MS as i64,
    200 * MS as i64,
    300 * MS as i64,
    400 * MS as i64,
    500 * MS as i64,
    S as i64,
    2 * S as i64,
    3 * S as i64,
    4 * S as i64,
    5 * S as i64,
    10 * S as i64,
    20 * S as i64,
    30 * S as i64,
    60 * S as i64,
    i64::MAX,
];

/// Returns the bucket containing `elapsed_nanos`.
///
/// Negative values land in the first bucket.
#[must_use]
pub fn bucket_for_nanos(elapsed_nanos: i64) -> &'static LatencyBucket {
    let index = BOUNDARIES.partition_point(|&boundary| boundary <= elapsed_nanos);
    &LATENCY_BUCKETS[index.min(LATENCY_BUCKETS.len() - 1)]
}

/// Counts operations per latency bucket.
#[derive(Debug)]
pub struct ResponseTimeCategorizer {
    counter: CategoricalCounter,
}

impl ResponseTimeCategorizer {
    /// Creates a categorizer named [`DEFAULT_CATEGORIZER_NAME`].
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
        clock: SharedClock,
    ) -> Self {
        Self::with_name(
            DEFAULT_CATEGORIZER_NAME,
            client_id,
            thread_id,
            collection_interval_secs,
            clock,
        )
    }

    /// Creates a categorizer with a custom tracker name.
    #[must_use]
    pub fn with_name(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
        clock: SharedClock,
    ) -> Self {
        Self {
            counter: CategoricalCounter::new(
                display_name,
                client_id,
                thread_id,
                collection_interval_secs,
                clock,
            ),
        }
    }

    /// Describes a categorizer for pre-registration.
    #[must_use]
    pub fn descriptor_stub(
        display_name: impl Into<String>,
        client_id: impl Into<String>,
        thread_id: impl Into<String>,
        collection_interval_secs: u32,
    ) -> TrackerDescriptor {
        CategoricalCounter::descriptor_stub(
            display_name,
            client_id,
            thread_id,
            collection_interval_secs,
        )
    }

    /// Records one operation that ran from `start_nanos` to `end_nanos`.
    pub fn categorize(&mut self, start_nanos: i64, end_nanos: i64) {
        let bucket = bucket_for_nanos(end_nanos.saturating_sub(start_nanos));
        self.counter.increment(bucket.label);
    }

    /// Records one operation that took `elapsed`.
    pub fn categorize_elapsed(&mut self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.categorize(0, nanos);
    }

    /// The live counter behind this categorizer.
    #[must_use]
    pub fn counter(&self) -> &CategoricalCounter {
        &self.counter
    }
}

impl StatTracker for ResponseTimeCategorizer {
    fn descriptor(&self) -> &TrackerDescriptor {
        self.counter.descriptor()
    }

    fn start(&mut self) {
        self.counter.start();
    }

    fn stop(&mut self) {
        self.counter.stop();
    }

    fn is_running(&self) -> bool {
        self.counter.is_running()
    }

    fn snapshot(&self) -> TrackerSnapshot {
        self.counter.snapshot()
    }
}
