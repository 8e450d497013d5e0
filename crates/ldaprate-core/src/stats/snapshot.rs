//! End-of-run tracker data and cross-thread aggregation.

use super::{TrackerDescriptor, TrackerKind};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Operation count and accumulated duration for one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub count: u64,
    pub total_nanos: u64,
}

/// Sample count and sum for one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInterval {
    pub count: u64,
    pub sum: i64,
}

/// Data captured from a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotData {
    /// From a [`CategoricalCounter`](super::CategoricalCounter).
    Categorical {
        /// Category labels in first-seen order.
        categories: Vec<String>,
        /// Totals aligned with `categories`.
        totals: Vec<u64>,
        /// Per-interval counts, each aligned with `categories`.
        intervals: Vec<Vec<u64>>,
    },
    /// From a [`TimeTracker`](super::TimeTracker).
    Time {
        intervals: Vec<TimeInterval>,
        total: TimeInterval,
        /// Shortest recorded duration.
        min_nanos: Option<u64>,
        /// Longest recorded duration.
        max_nanos: Option<u64>,
    },
    /// From an [`IncrementalTracker`](super::IncrementalTracker).
    Incremental {
        intervals: Vec<u64>,
        total: u64,
    },
    /// From an [`IntegerValueTracker`](super::IntegerValueTracker).
    IntegerValue {
        intervals: Vec<ValueInterval>,
        total: ValueInterval,
    },
}

impl SnapshotData {
    fn kind(&self) -> TrackerKind {
        match self {
            Self::Categorical { .. } => TrackerKind::Categorical,
            Self::Time { .. } => TrackerKind::Time,
            Self::Incremental { .. } => TrackerKind::Incremental,
            Self::IntegerValue { .. } => TrackerKind::IntegerValue,
        }
    }

    /// Number of observations recorded over the whole run.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        match self {
            Self::Categorical { totals, .. } => totals.iter().sum(),
            Self::Time { total, .. } => total.count,
            Self::Incremental { total, .. } => *total,
            Self::IntegerValue { total, .. } => total.count,
        }
    }

    /// Number of complete intervals.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        match self {
            Self::Categorical { intervals, .. } => intervals.len(),
            Self::Time { intervals, .. } => intervals.len(),
            Self::Incremental { intervals, .. } => intervals.len(),
            Self::IntegerValue { intervals, .. } => intervals.len(),
        }
    }
}

/// Everything a tracker collected during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub descriptor: TrackerDescriptor,
    /// Epoch millis of the start; `None` if the tracker never started.
    pub started_at_millis: Option<i64>,
    /// Epoch millis of the stop; `None` while still running.
    pub stopped_at_millis: Option<i64>,
    pub data: SnapshotData,
}

impl TrackerSnapshot {
    /// Count recorded for `category`; zero for unknown categories and for
    /// non-categorical trackers.
    #[must_use]
    pub fn category_count(&self, category: &str) -> u64 {
        match &self.data {
            SnapshotData::Categorical {
                categories, totals, ..
            } => categories
                .iter()
                .position(|c| c == category)
                .map_or(0, |i| totals[i]),
            _ => 0,
        }
    }

    /// Average duration in milliseconds for time trackers.
    #[must_use]
    pub fn average_millis(&self) -> Option<f64> {
        match &self.data {
            SnapshotData::Time { total, .. } if total.count > 0 => {
                Some(total.total_nanos as f64 / total.count as f64 / 1_000_000.0)
            }
            _ => None,
        }
    }

    /// Average sample value for integer-value trackers.
    #[must_use]
    pub fn average_value(&self) -> Option<f64> {
        match &self.data {
            SnapshotData::IntegerValue { total, .. } if total.count > 0 => {
                Some(total.sum as f64 / total.count as f64)
            }
            _ => None,
        }
    }
}

/// Merges the per-thread snapshots of one tracker.
///
/// Categories are unioned in first-seen order and interval series are summed
/// index-wise; shorter series count as zero past their end.
pub fn aggregate(snapshots: &[TrackerSnapshot]) -> CoreResult<TrackerSnapshot> {
    let first = snapshots
        .first()
        .ok_or_else(|| CoreError::Aggregation("no snapshots were provided".to_string()))?;

    for snapshot in &snapshots[1..] {
        if snapshot.descriptor.display_name != first.descriptor.display_name {
            return Err(CoreError::Aggregation(format!(
                "tracker '{}' cannot be merged with '{}'",
                snapshot.descriptor.display_name, first.descriptor.display_name
            )));
        }
        if snapshot.data.kind() != first.data.kind() {
            return Err(CoreError::Aggregation(format!(
                "tracker '{}' mixes {} and {} data",
                first.descriptor.display_name,
                first.data.kind(),
                snapshot.data.kind()
            )));
        }
    }

    let mut descriptor = first.descriptor.clone();
    if snapshots.len() > 1 {
        descriptor.thread_id = "*".to_string();
    }

    let data = match &first.data {
        SnapshotData::Categorical { .. } => merge_categorical(snapshots),
        SnapshotData::Time { .. } => merge_time(snapshots),
        SnapshotData::Incremental { .. } => merge_incremental(snapshots),
        SnapshotData::IntegerValue { .. } => merge_values(snapshots),
    };

    Ok(TrackerSnapshot {
        descriptor,
        started_at_millis: snapshots.iter().filter_map(|s| s.started_at_millis).min(),
        stopped_at_millis: snapshots.iter().filter_map(|s| s.stopped_at_millis).max(),
        data,
    })
}

fn merge_series<T: Copy + Default>(
    series: impl Iterator<Item = Vec<T>>,
    mut add: impl FnMut(&mut T, &T),
) -> Vec<T> {
    let mut merged: Vec<T> = Vec::new();
    for intervals in series {
        if intervals.len() > merged.len() {
            merged.resize(intervals.len(), T::default());
        }
        for (slot, value) in merged.iter_mut().zip(intervals.iter()) {
            add(slot, value);
        }
    }
    merged
}

fn merge_categorical(snapshots: &[TrackerSnapshot]) -> SnapshotData {
    let mut categories: Vec<String> = Vec::new();
    let mut totals: Vec<u64> = Vec::new();
    let mut intervals: Vec<Vec<u64>> = Vec::new();

    for snapshot in snapshots {
        let SnapshotData::Categorical {
            categories: names,
            totals: counts,
            intervals: series,
        } = &snapshot.data
        else {
            continue;
        };

        let mapping: Vec<usize> = names
            .iter()
            .map(|name| match categories.iter().position(|c| c == name) {
                Some(i) => i,
                None => {
                    categories.push(name.clone());
                    totals.push(0);
                    categories.len() - 1
                }
            })
            .collect();

        for (local, global) in mapping.iter().enumerate() {
            totals[*global] += counts[local];
        }

        if series.len() > intervals.len() {
            intervals.resize(series.len(), Vec::new());
        }
        for (merged, counts) in intervals.iter_mut().zip(series.iter()) {
            for (local, count) in counts.iter().enumerate() {
                let global = mapping[local];
                if merged.len() <= global {
                    merged.resize(global + 1, 0);
                }
                merged[global] += count;
            }
        }
    }

    for interval in &mut intervals {
        interval.resize(categories.len(), 0);
    }

    SnapshotData::Categorical {
        categories,
        totals,
        intervals,
    }
}

fn merge_time(snapshots: &[TrackerSnapshot]) -> SnapshotData {
    let time_parts = || {
        snapshots.iter().filter_map(|s| match &s.data {
            SnapshotData::Time {
                intervals,
                total,
                min_nanos,
                max_nanos,
            } => Some((intervals, total, min_nanos, max_nanos)),
            _ => None,
        })
    };

    let intervals = merge_series(time_parts().map(|(i, _, _, _)| i.clone()), |a, b| {
        a.count += b.count;
        a.total_nanos += b.total_nanos;
    });
    let total = time_parts().fold(TimeInterval::default(), |acc, (_, t, _, _)| TimeInterval {
        count: acc.count + t.count,
        total_nanos: acc.total_nanos + t.total_nanos,
    });

    SnapshotData::Time {
        intervals,
        total,
        min_nanos: time_parts().filter_map(|(_, _, min, _)| *min).min(),
        max_nanos: time_parts().filter_map(|(_, _, _, max)| *max).max(),
    }
}

fn merge_incremental(snapshots: &[TrackerSnapshot]) -> SnapshotData {
    let parts: Vec<(&Vec<u64>, u64)> = snapshots
        .iter()
        .filter_map(|s| match &s.data {
            SnapshotData::Incremental { intervals, total } => Some((intervals, *total)),
            _ => None,
        })
        .collect();

    SnapshotData::Incremental {
        intervals: merge_series(parts.iter().map(|(i, _)| (*i).clone()), |a, b| *a += b),
        total: parts.iter().map(|(_, t)| t).sum(),
    }
}

fn merge_values(snapshots: &[TrackerSnapshot]) -> SnapshotData {
    let parts: Vec<(&Vec<ValueInterval>, ValueInterval)> = snapshots
        .iter()
        .filter_map(|s| match &s.data {
            SnapshotData::IntegerValue { intervals, total } => Some((intervals, *total)),
            _ => None,
        })
        .collect();

    SnapshotData::IntegerValue {
        intervals: merge_series(parts.iter().map(|(i, _)| (*i).clone()), |a, b| {
            a.count += b.count;
            a.sum += b.sum;
        }),
        total: parts.iter().fold(ValueInterval::default(), |acc, (_, t)| ValueInterval {
            count: acc.count + t.count,
            sum: acc.sum + t.sum,
        }),
    }
}
