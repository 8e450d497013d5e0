use clap::{Parser, Subcommand};
use ldaprate_core::{RealTimeReporter, SnapshotData, SystemClock, TrackerSnapshot, LATENCY_BUCKETS};
use ldaprate_jobs::{
    definition_for, parameter_schema, Config, JobKind, JobReport, JobRunner,
    MemoryConnectionFactory, MemoryDirectory, PrometheusReporter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ldaprate")]
#[command(about = "Rate-limited LDAP load generation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a job against the in-memory directory
    Run {
        /// Job configuration file
        #[arg(long, env = "LDAPRATE_CONFIG")]
        config: Option<PathBuf>,

        /// Overrides job.duration, e.g. "30s"
        #[arg(long)]
        duration: Option<String>,

        /// Write the JSON job report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the Prometheus text exposition here
        #[arg(long)]
        metrics: Option<PathBuf>,
    },

    /// Load and validate a configuration file
    Validate {
        /// Job configuration file
        #[arg(long, env = "LDAPRATE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the parameters a job kind accepts
    Params {
        /// Job kind, e.g. "search-and-bind"
        #[arg(long)]
        kind: JobKind,
    },

    /// Print the response time categories
    Buckets,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            report,
            metrics,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(duration) = duration {
                config.job.duration = Some(duration);
            }
            init_logging(&config);
            config.validate()?;
            run(&config, report.as_deref(), metrics.as_deref())
        }

        Commands::Validate { config } => {
            let config = Config::load(config.as_deref())?;
            init_logging(&config);
            config.validate()?;
            println!("Configuration is valid ({} job)", config.job.kind);
            Ok(())
        }

        Commands::Params { kind } => {
            println!("{:<40} {:<9} {:<48} Description", "Key", "Required", "Default");
            for param in parameter_schema(kind) {
                println!(
                    "{:<40} {:<9} {:<48} {}",
                    param.key,
                    if param.required { "yes" } else { "no" },
                    param.default.unwrap_or("-"),
                    param.description
                );
            }
            Ok(())
        }

        Commands::Buckets => {
            println!("{:<26} {:>14} {:>14}", "Category", "From (ms)", "To (ms)");
            for bucket in &LATENCY_BUCKETS {
                let upper = bucket
                    .upper_nanos
                    .map_or_else(|| "-".to_string(), format_millis);
                println!(
                    "{:<26} {:>14} {:>14}",
                    bucket.label,
                    format_millis(bucket.lower_nanos),
                    upper
                );
            }
            Ok(())
        }
    }
}

fn run(
    config: &Config,
    report_path: Option<&Path>,
    metrics_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.run_settings()?;
    if settings.duration.is_none() {
        return Err("job.duration (or --duration) is required on the command line".into());
    }

    let directory = Arc::new(
        MemoryDirectory::new().with_latency(Duration::from_millis(config.directory.latency_ms)),
    );
    directory.populate_users(
        &config.directory.base_dn,
        config.directory.users,
        &config.directory.user_password,
    );
    tracing::info!(
        base_dn = %config.directory.base_dn,
        users = config.directory.users,
        "seeded in-memory directory"
    );

    let definition = definition_for(config)?;
    let factory = Arc::new(MemoryConnectionFactory::new(directory.clone()));
    let reporter = metrics_path
        .map(|_| PrometheusReporter::new().map(Arc::new))
        .transpose()?;

    let runner = JobRunner::new(SystemClock::shared());
    let report = runner.run(
        definition,
        &settings,
        factory,
        reporter
            .clone()
            .map(|r| r as Arc<dyn RealTimeReporter>),
    )?;

    print_summary(&report);
    let counts = directory.counts();
    println!(
        "\nDirectory: {} connects, {} searches, {} binds, {} modifies",
        counts.connects, counts.searches, counts.binds, counts.modifies
    );

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "wrote job report");
    }
    if let (Some(path), Some(reporter)) = (metrics_path, reporter) {
        std::fs::write(path, reporter.render())?;
        tracing::info!(path = %path.display(), "wrote metrics");
    }

    for thread in &report.threads {
        if let Some(error) = &thread.error {
            eprintln!("{}: {}", thread.thread_id, error);
        }
    }
    Ok(())
}

fn print_summary(report: &JobReport) {
    println!("\nJob {} ({}): {}", report.job_id, report.kind, report.status);
    println!(
        "  Started: {}  Stopped: {}  Iterations: {}",
        report.started_at,
        report.stopped_at,
        report.total_iterations()
    );

    for tracker in &report.trackers {
        println!("\n{}", tracker.descriptor.display_name);
        print_tracker(tracker);
    }
}

fn print_tracker(tracker: &TrackerSnapshot) {
    match &tracker.data {
        SnapshotData::Categorical {
            categories, totals, ..
        } => {
            let total: u64 = totals.iter().sum();
            for (category, count) in categories.iter().zip(totals) {
                let percent = if total == 0 {
                    0.0
                } else {
                    *count as f64 * 100.0 / total as f64
                };
                println!("  {category:<32} {count:>10} {percent:>7.2}%");
            }
        }
        SnapshotData::Time { total, .. } => {
            let average = tracker
                .average_millis()
                .map_or_else(|| "-".to_string(), |ms| format!("{ms:.3}"));
            println!("  Count: {}  Average (ms): {average}", total.count);
        }
        SnapshotData::Incremental { total, .. } => {
            let per_second = tracker
                .started_at_millis
                .zip(tracker.stopped_at_millis)
                .map(|(start, stop)| stop - start)
                .filter(|elapsed| *elapsed > 0)
                .map_or(0.0, |elapsed| *total as f64 * 1000.0 / elapsed as f64);
            println!("  Total: {total}  Per second: {per_second:.2}");
        }
        SnapshotData::IntegerValue { total, .. } => {
            let average = tracker
                .average_value()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
            println!("  Samples: {}  Average: {average}", total.count);
        }
    }
}

fn format_millis(nanos: u64) -> String {
    let millis = nanos / 1_000_000;
    millis.to_string()
}

/// `RUST_LOG` wins; otherwise the configured level applies.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
