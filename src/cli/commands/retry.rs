//! Retry command implementation
//!
//! Re-exports exactly the units listed in a failed-units file. The destination
//! is always appended to, so units that succeeded earlier are left alone.

use super::export::run_export;
use crate::cli::{exit_code_for, EXIT_CONFIG};
use crate::config::load_config;
use crate::core::export::{ExportCoordinator, ExportOverrides, FailedUnitsFile};
use crate::domain::DestinationName;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the retry command
#[derive(Args, Debug)]
pub struct RetryArgs {
    /// Failed-units file written by an earlier export
    #[arg(long, value_name = "PATH")]
    pub failed_units: PathBuf,

    /// Destination to append to
    #[arg(long)]
    pub destination: String,

    /// Requested fetch workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Where to save units that fail again (defaults to overwriting the input file)
    #[arg(long, value_name = "PATH")]
    pub failed_units_out: Option<PathBuf>,
}

impl RetryArgs {
    /// Execute the retry command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let destination = match DestinationName::new(self.destination.as_str()) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Invalid destination: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let file = match FailedUnitsFile::load(&self.failed_units) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{e}");
                return Ok(exit_code_for(&e));
            }
        };
        if file.destination != destination.as_str() {
            tracing::warn!(
                original = %file.destination,
                destination = %destination,
                "Retrying into a different destination than the original run"
            );
        }

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(exit_code_for(&e));
            }
        };
        let grace = Duration::from_secs(config.export.shutdown_timeout_secs);

        let coordinator = match ExportCoordinator::new(config) {
            Ok(c) => c.with_shutdown(shutdown_signal.clone()),
            Err(e) => {
                eprintln!("Failed to initialize retry: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let overrides = ExportOverrides {
            max_workers: self.workers,
            failed_units_out: Some(
                self.failed_units_out
                    .clone()
                    .unwrap_or_else(|| self.failed_units.clone()),
            ),
            ..Default::default()
        };

        println!(
            "🔁 Retrying {} unit(s) into '{}'...",
            file.units.len(),
            destination
        );
        Ok(run_export(
            coordinator.retry(&file, destination, &overrides),
            shutdown_signal,
            grace,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_parse_retry_args() {
        let cli = Cli::parse_from([
            "quarry",
            "retry",
            "--failed-units",
            "events_jan.failed_units.json",
            "--destination",
            "events_jan",
            "--workers",
            "4",
        ]);
        let Commands::Retry(args) = cli.command else {
            panic!("expected retry");
        };
        assert_eq!(
            args.failed_units,
            PathBuf::from("events_jan.failed_units.json")
        );
        assert_eq!(args.workers, Some(4));
        assert!(args.failed_units_out.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let (_tx, rx) = watch::channel(false);
        let args = RetryArgs {
            failed_units: PathBuf::from("/nonexistent/failed.json"),
            destination: "events_jan".to_string(),
            workers: None,
            failed_units_out: None,
        };
        assert_eq!(args.execute("quarry.toml", rx).await.unwrap(), EXIT_CONFIG);
    }
}
