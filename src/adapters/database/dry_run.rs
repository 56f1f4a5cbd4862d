//! Sink that writes nothing

use super::traits::StorageSink;
use crate::domain::{DestinationName, NormalizedRecord, StorageError};
use async_trait::async_trait;

/// Counts the rows it would have written
#[derive(Debug, Default)]
pub struct DryRunSink {
    rows: usize,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[async_trait]
impl StorageSink for DryRunSink {
    fn kind(&self) -> &'static str {
        "dry-run"
    }

    async fn exists(&mut self, _destination: &DestinationName) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn create(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError> {
        tracing::info!(destination = %destination, "Dry run: would create destination");
        self.append(destination, records).await
    }

    async fn append(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError> {
        tracing::debug!(
            destination = %destination,
            rows = records.len(),
            "Dry run: skipping write"
        );
        self.rows += records.len();
        Ok(records.len())
    }
}
