//! Storage sink factory

use crate::adapters::database::{DryRunSink, StorageSink};
use crate::adapters::jsonl::JsonlSink;
use crate::adapters::postgresql::PostgreSQLSink;
use crate::config::schema::{DestinationTarget, QuarryConfig};
use crate::domain::{QuarryError, Result};

/// Create the sink selected by `destination_target`
///
/// With `dry_run` set, a [`DryRunSink`] is returned and no store is contacted.
///
/// # Errors
///
/// Returns an error if the selected section is missing or the store cannot be reached.
pub async fn create_sink(config: &QuarryConfig, dry_run: bool) -> Result<Box<dyn StorageSink>> {
    if dry_run {
        tracing::info!("Dry run mode: records will not be written");
        return Ok(Box::new(DryRunSink::new()));
    }

    match config.destination_target {
        DestinationTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                QuarryError::Configuration("postgresql section is missing".to_string())
            })?;

            tracing::info!("Creating PostgreSQL sink");
            let sink = PostgreSQLSink::connect(pg_config.clone()).await?;
            Ok(Box::new(sink))
        }
        DestinationTarget::Jsonl => {
            let jsonl_config = config.jsonl.as_ref().ok_or_else(|| {
                QuarryError::Configuration("jsonl section is missing".to_string())
            })?;

            tracing::info!(directory = %jsonl_config.directory, "Creating JSON-lines sink");
            let sink = JsonlSink::new(&jsonl_config.directory)?;
            Ok(Box::new(sink))
        }
    }
}
