//! Export command implementation
//!
//! `quarry export events` and `quarry export profiles`.

use crate::cli::{exit_code_for, exit_code_for_result, EXIT_CONFIG, EXIT_INTERRUPTED};
use crate::config::load_config;
use crate::core::export::{ExportCoordinator, ExportOutcome, ExportOverrides};
use crate::domain::{DestinationName, ExportRequest, Result, SourceQuery};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub target: ExportTarget,
}

/// What to export
#[derive(Subcommand, Debug)]
pub enum ExportTarget {
    /// Export raw events between two days (inclusive)
    Events(EventsArgs),

    /// Export all user profiles
    Profiles(ProfilesArgs),
}

/// Flags shared by every command that runs the engine
#[derive(Args, Debug, Clone, Default)]
pub struct RunFlags {
    /// Requested fetch workers (clamped to the API's concurrency ceiling)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Append to an existing destination instead of creating it
    #[arg(long)]
    pub append: bool,

    /// Fetch and transform without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Where to save failed units for `quarry retry`
    #[arg(long, value_name = "PATH")]
    pub failed_units_out: Option<PathBuf>,
}

impl RunFlags {
    fn overrides(&self, chunk_days: Option<u32>) -> ExportOverrides {
        ExportOverrides {
            max_workers: self.workers,
            chunk_days,
            append: self.append,
            dry_run: self.dry_run,
            failed_units_out: self.failed_units_out.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub to: NaiveDate,

    /// Destination table or file name
    #[arg(long)]
    pub destination: String,

    /// Only these event names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub event: Vec<String>,

    /// Remote filter expression
    #[arg(long = "where", value_name = "EXPR")]
    pub where_clause: Option<String>,

    /// Days per work unit
    #[arg(long)]
    pub chunk_days: Option<u32>,

    #[command(flatten)]
    pub run: RunFlags,
}

#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Destination table or file name
    #[arg(long)]
    pub destination: String,

    /// Remote filter expression
    #[arg(long = "where", value_name = "EXPR")]
    pub where_clause: Option<String>,

    #[command(flatten)]
    pub run: RunFlags,
}

impl ExportArgs {
    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let (destination, query, overrides) = match &self.target {
            ExportTarget::Events(args) => (
                &args.destination,
                SourceQuery {
                    events: args.event.clone(),
                    where_clause: args.where_clause.clone(),
                },
                args.run.overrides(args.chunk_days),
            ),
            ExportTarget::Profiles(args) => (
                &args.destination,
                SourceQuery {
                    events: Vec::new(),
                    where_clause: args.where_clause.clone(),
                },
                args.run.overrides(None),
            ),
        };

        let destination = match DestinationName::new(destination.as_str()) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Invalid destination: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let request = match &self.target {
            ExportTarget::Events(args) => ExportRequest::events(destination, args.from, args.to),
            ExportTarget::Profiles(_) => ExportRequest::profiles(destination),
        }
        .with_query(query);

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_code_for(&e));
            }
        };
        let grace = Duration::from_secs(config.export.shutdown_timeout_secs);

        let coordinator = match ExportCoordinator::new(config) {
            Ok(c) => c.with_shutdown(shutdown_signal.clone()),
            Err(e) => {
                eprintln!("Failed to initialize export: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        if overrides.dry_run {
            println!("🔍 DRY RUN MODE - No data will be written");
        }
        println!("🚀 Starting export into '{}'...", request.destination);

        Ok(run_export(
            coordinator.execute(request, &overrides),
            shutdown_signal,
            grace,
        )
        .await)
    }
}

/// Drive an export to an exit code
///
/// After a shutdown signal, in-flight units get `grace` to drain; past that
/// the export is abandoned.
pub(crate) async fn run_export<F>(
    export: F,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> i32
where
    F: Future<Output = Result<ExportOutcome>>,
{
    tokio::pin!(export);

    let outcome = tokio::select! {
        outcome = &mut export => outcome,
        _ = grace_elapsed(&mut shutdown, grace) => {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed, abandoning export"
            );
            eprintln!("⚠️  In-flight units did not finish within {}s", grace.as_secs());
            return EXIT_INTERRUPTED;
        }
    };

    match outcome {
        Ok(outcome) => {
            print_summary(&outcome);
            exit_code_for_result(&outcome.result)
        }
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            eprintln!("Export failed: {e}");
            exit_code_for(&e)
        }
    }
}

/// Resolves `grace` after the shutdown flag is set; never resolves otherwise
async fn grace_elapsed(shutdown: &mut watch::Receiver<bool>, grace: Duration) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

fn print_summary(outcome: &ExportOutcome) {
    let result = &outcome.result;

    println!();
    println!("📊 Export Summary:");
    println!("  Destination: {}", result.destination);
    println!("  Units: {}", result.total_units);
    println!("  Successful: {}", result.successful_units);
    println!("  Failed: {}", result.failed_units);
    println!("  Rows: {}", result.total_rows);
    println!("  Duration: {:.2}s", result.duration.as_secs_f64());
    println!("  Success Rate: {:.2}%", result.success_rate());
    println!();

    if !result.failures.is_empty() {
        println!("⚠️  Failed units:");
        for failure in result.failures.iter().take(10) {
            println!(
                "  - {} ({:?}): {}",
                failure.descriptor, failure.stage, failure.message
            );
        }
        if result.failures.len() > 10 {
            println!("  ... and {} more", result.failures.len() - 10);
        }
        println!();
    }

    if let Some(ref path) = outcome.failed_units_file {
        println!(
            "   Retry with: quarry retry --failed-units {} --destination {}",
            path.display(),
            result.destination
        );
        println!();
    }

    if result.interrupted {
        println!("⚠️  Export interrupted. Unclaimed units were cancelled.");
    } else if result.has_failures() {
        println!("⚠️  Export completed with failures");
    } else {
        println!("✅ Export completed successfully!");
    }
}
