//! Export coordinator - runs one export end to end from configuration
//!
//! The coordinator turns configuration plus command-line overrides into
//! [`RunOptions`], opens the configured sink, runs the engine and saves the
//! failed units of a partial run so they can be retried.

use crate::adapters::analytics::{AnalyticsClient, FetchClient};
use crate::adapters::database::create_sink;
use crate::config::QuarryConfig;
use crate::core::export::aggregator::{AggregateResult, BatchProgress, ProgressCallback};
use crate::core::export::engine::{ParallelFetchEngine, RunOptions};
use crate::core::export::failed_units::FailedUnitsFile;
use crate::core::export::rate_limit::ApiLimits;
use crate::core::export::writer::WriteMode;
use crate::core::transform::RecordFormat;
use crate::domain::{DestinationName, ExportRequest, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-invocation settings that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct ExportOverrides {
    pub max_workers: Option<usize>,
    pub chunk_days: Option<u32>,
    pub append: bool,
    pub dry_run: bool,
    /// Where to save failed units instead of `export.failed_units_path`
    pub failed_units_out: Option<PathBuf>,
}

/// What a finished export produced
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub result: AggregateResult,
    /// Set when the run had failures and they were saved
    pub failed_units_file: Option<PathBuf>,
}

/// Export coordinator
pub struct ExportCoordinator {
    config: QuarryConfig,
    engine: ParallelFetchEngine,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ExportCoordinator {
    /// Create a coordinator that fetches from the configured analytics API
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client can't be built.
    pub fn new(config: QuarryConfig) -> Result<Self> {
        let client = AnalyticsClient::new(config.source.clone())?;
        Ok(Self::with_fetcher(config, Arc::new(client)))
    }

    /// Create a coordinator around any fetch client
    pub fn with_fetcher(config: QuarryConfig, fetcher: Arc<dyn FetchClient>) -> Self {
        let limits = ApiLimits::from(&config.source.limits);
        Self {
            engine: ParallelFetchEngine::new(fetcher, limits),
            config,
            shutdown: None,
        }
    }

    /// Stop claiming new units once `shutdown` flips to `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Engine options from configuration, with `overrides` applied on top
    ///
    /// # Errors
    ///
    /// Returns an error if the configured record format is unknown.
    pub fn run_options(&self, overrides: &ExportOverrides) -> Result<RunOptions> {
        let export = &self.config.export;
        let format: RecordFormat = export.record_format.parse()?;

        let mut options = RunOptions::default()
            .with_chunk_days(overrides.chunk_days.unwrap_or(export.chunk_days))
            .with_max_workers(overrides.max_workers.unwrap_or(export.max_workers))
            .with_format(format)
            .with_dry_run(
                overrides.dry_run || export.dry_run || self.config.application.dry_run,
            );
        if let Some(capacity) = export.queue_capacity {
            options = options.with_queue_capacity(capacity);
        }
        if overrides.append {
            options = options.with_write_mode(WriteMode::Append);
        }
        if let Some(ref shutdown) = self.shutdown {
            options = options.with_shutdown(shutdown.clone());
        }
        Ok(options)
    }

    /// Run `request` against the configured sink
    ///
    /// # Errors
    ///
    /// Returns an error for planning and discovery failures, when the sink
    /// can't be opened, or when failed units can't be saved. Per-unit failures
    /// are reported in the returned result.
    pub async fn execute(
        &self,
        request: ExportRequest,
        overrides: &ExportOverrides,
    ) -> Result<ExportOutcome> {
        let options = self.run_options(overrides)?;
        tracing::info!(
            destination = %request.destination,
            scope = ?request.scope,
            workers = options.max_workers,
            dry_run = options.dry_run,
            mode = ?options.write_mode,
            "Starting export"
        );

        let sink = create_sink(&self.config, options.dry_run).await?;
        let destination = request.destination.clone();
        let kind = request.scope.record_kind();
        let query = request.query.clone();

        let result = self
            .engine
            .run(request, options, sink, Some(progress_logger()))
            .await?;

        let failed_units_file = match kind {
            Some(kind) if !result.failed_unit_descriptors.is_empty() => {
                let path = self.failed_units_path(&destination, overrides);
                FailedUnitsFile::new(
                    &destination,
                    kind,
                    query,
                    result.failed_unit_descriptors.clone(),
                )
                .save(&path)?;
                Some(path)
            }
            // An explicit output path still listing units from an earlier run
            // would make the next retry write them twice
            Some(_) if overrides.failed_units_out.is_some() && !result.dry_run => {
                let path = self.failed_units_path(&destination, overrides);
                FailedUnitsFile::clear(&path)?;
                None
            }
            _ => None,
        };

        Ok(ExportOutcome {
            result,
            failed_units_file,
        })
    }

    /// Re-export the units of a retry file into `destination`, appending
    ///
    /// # Errors
    ///
    /// Same as [`ExportCoordinator::execute`].
    pub async fn retry(
        &self,
        file: &FailedUnitsFile,
        destination: DestinationName,
        overrides: &ExportOverrides,
    ) -> Result<ExportOutcome> {
        tracing::info!(
            destination = %destination,
            original = %file.destination,
            units = file.units.len(),
            "Retrying failed units"
        );
        let overrides = ExportOverrides {
            append: true,
            ..overrides.clone()
        };
        self.execute(file.to_request(destination), &overrides).await
    }

    fn failed_units_path(
        &self,
        destination: &DestinationName,
        overrides: &ExportOverrides,
    ) -> PathBuf {
        overrides
            .failed_units_out
            .clone()
            .or_else(|| self.config.export.failed_units_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| FailedUnitsFile::default_path(destination))
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|progress: &BatchProgress| {
        if progress.success {
            tracing::info!(
                unit_index = progress.unit_index,
                total_units = progress.total_units,
                rows = progress.rows,
                "Unit complete"
            );
        } else {
            tracing::warn!(
                unit_index = progress.unit_index,
                total_units = progress.total_units,
                error = progress.error.as_deref().unwrap_or("unknown"),
                "Unit failed"
            );
        }
    })
}
