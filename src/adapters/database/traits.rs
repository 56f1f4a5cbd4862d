//! Storage sink trait
//!
//! Destination stores permit a single mutator, so every method takes
//! `&mut self`: whoever owns the boxed sink is the only code that can write.
//! The engine moves it into its writer task.

use crate::domain::{DestinationName, NormalizedRecord, StorageError};
use async_trait::async_trait;

/// A destination store
#[async_trait]
pub trait StorageSink: Send {
    /// Short name for logs (e.g. `postgresql`, `jsonl`)
    fn kind(&self) -> &'static str;

    /// Check whether the destination already exists
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn exists(&mut self, destination: &DestinationName) -> Result<bool, StorageError>;

    /// Create the destination and write the first batch
    ///
    /// Must fail with [`StorageError::DestinationExists`] rather than write
    /// into a destination that is already there. An empty batch still creates
    /// an empty destination.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or the write fails; nothing is left behind.
    async fn create(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError>;

    /// Append a batch to an existing destination
    ///
    /// Each call is its own unit of durability: either every record of the
    /// batch is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn append(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError>;
}
