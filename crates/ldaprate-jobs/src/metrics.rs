//! Prometheus real-time reporting.
//!
//! Time trackers push each duration into `ldaprate_realtime_observation`
//! (milliseconds, bucketed on the latency category boundaries); incremental
//! trackers bump `ldaprate_realtime_count_total`. Both are labelled by job id
//! and tracker name.

use crate::error::JobResult;
use ldaprate_core::{RealTimeReporter, TrackerDescriptor, TrackerKind, LATENCY_BUCKETS};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// A [`RealTimeReporter`] backed by its own Prometheus registry.
#[derive(Clone)]
pub struct PrometheusReporter {
    registry: Registry,
    observations: HistogramVec,
    counts: CounterVec,
}

impl std::fmt::Debug for PrometheusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusReporter").finish_non_exhaustive()
    }
}

impl PrometheusReporter {
    /// Creates and registers the reporter's metrics.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Metrics` if registration fails.
    pub fn new() -> JobResult<Self> {
        let registry = Registry::new();

        let buckets: Vec<f64> = LATENCY_BUCKETS
            .iter()
            .filter_map(|b| b.upper_nanos)
            .map(|nanos| nanos as f64 / 1_000_000.0)
            .collect();
        let observations = HistogramVec::new(
            HistogramOpts::new(
                "ldaprate_realtime_observation",
                "Durations pushed by time trackers, in milliseconds",
            )
            .buckets(buckets),
            &["job_id", "tracker"],
        )?;
        let counts = CounterVec::new(
            Opts::new(
                "ldaprate_realtime_count_total",
                "Increments pushed by incremental trackers",
            ),
            &["job_id", "tracker"],
        )?;

        registry.register(Box::new(observations.clone()))?;
        registry.register(Box::new(counts.clone()))?;

        Ok(Self {
            registry,
            observations,
            counts,
        })
    }

    /// The registry the metrics live in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Exports the metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }

        String::from_utf8(buffer).unwrap_or_else(|e| {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}

impl RealTimeReporter for PrometheusReporter {
    fn report(&self, job_id: &str, tracker: &TrackerDescriptor, value: f64) {
        let labels = [job_id, tracker.display_name.as_str()];
        match tracker.kind {
            TrackerKind::Time => self.observations.with_label_values(&labels).observe(value),
            TrackerKind::Incremental => self.counts.with_label_values(&labels).inc_by(value),
            TrackerKind::Categorical | TrackerKind::IntegerValue => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, kind: TrackerKind) -> TrackerDescriptor {
        TrackerDescriptor::new(name, kind, "client", "thread-0", 60)
    }

    #[test]
    fn test_time_observations_are_exported() {
        let reporter = PrometheusReporter::new().unwrap();
        let timer = descriptor("Bind Duration (ms)", TrackerKind::Time);

        reporter.report("job-1", &timer, 1.5);
        reporter.report("job-1", &timer, 250.0);

        let families = reporter.registry().gather();
        let family = families
            .iter()
            .find(|m| m.get_name() == "ldaprate_realtime_observation")
            .unwrap();
        let histogram = family.get_metric()[0].get_histogram();
        assert_eq!(histogram.get_sample_count(), 2);
        assert!(reporter.render().contains("tracker=\"Bind Duration (ms)\""));
    }

    #[test]
    fn test_incremental_counts_are_exported() {
        let reporter = PrometheusReporter::new().unwrap();
        let completed = descriptor("Binds Completed", TrackerKind::Incremental);

        for _ in 0..3 {
            reporter.report("job-1", &completed, 1.0);
        }

        let text = reporter.render();
        assert!(text.contains("ldaprate_realtime_count_total"));
        assert!(text.contains("} 3"));
    }

    #[test]
    fn test_reporters_do_not_share_registries() {
        let first = PrometheusReporter::new().unwrap();
        let second = PrometheusReporter::new().unwrap();
        first.report("a", &descriptor("x", TrackerKind::Incremental), 1.0);

        assert!(!second.render().contains("job_id=\"a\""));
    }
}
