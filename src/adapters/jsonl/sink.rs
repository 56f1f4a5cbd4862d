//! JSON-lines sink

use crate::adapters::database::StorageSink;
use crate::domain::{DestinationName, NormalizedRecord, QuarryError, Result, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes destinations as `.jsonl` files in one directory
#[derive(Debug)]
pub struct JsonlSink {
    directory: PathBuf,
}

impl JsonlSink {
    /// Use `directory`, creating it if needed
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| {
            QuarryError::Storage(StorageError::ConnectionFailed(format!(
                "cannot create output directory {}: {}",
                directory.display(),
                e
            )))
        })?;
        Ok(Self { directory })
    }

    /// File backing `destination`
    pub fn path_for(&self, destination: &DestinationName) -> PathBuf {
        self.directory.join(format!("{destination}.jsonl"))
    }

    fn encode(records: &[NormalizedRecord]) -> std::result::Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| {
                StorageError::WriteFailed(format!("cannot encode record {}: {}", record.id, e))
            })?;
            buf.push(b'\n');
        }
        Ok(buf)
    }

    async fn write_all(file: &mut fs::File, buf: &[u8]) -> std::io::Result<()> {
        file.write_all(buf).await?;
        file.flush().await?;
        file.sync_data().await
    }

    async fn truncate_to(file: &mut fs::File, len: u64) -> std::io::Result<()> {
        file.set_len(len).await?;
        file.sync_data().await
    }
}

#[async_trait]
impl StorageSink for JsonlSink {
    fn kind(&self) -> &'static str {
        "jsonl"
    }

    async fn exists(
        &mut self,
        destination: &DestinationName,
    ) -> std::result::Result<bool, StorageError> {
        fs::try_exists(self.path_for(destination))
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
    }

    async fn create(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> std::result::Result<usize, StorageError> {
        let path = self.path_for(destination);
        let buf = Self::encode(records)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    StorageError::DestinationExists(path.display().to_string())
                }
                _ => StorageError::SchemaFailed(format!("{}: {}", path.display(), e)),
            })?;

        if let Err(e) = Self::write_all(&mut file, &buf).await {
            drop(file);
            // A failed create leaves nothing behind
            if let Err(remove_err) = fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %remove_err,
                    "Failed to remove partial file"
                );
            }
            return Err(StorageError::WriteFailed(format!("{}: {}", path.display(), e)));
        }

        Ok(records.len())
    }

    async fn append(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> std::result::Result<usize, StorageError> {
        let path = self.path_for(destination);
        let buf = Self::encode(records)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", path.display(), e)))?;

        let start = file
            .metadata()
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {}", path.display(), e)))?
            .len();

        if let Err(e) = Self::write_all(&mut file, &buf).await {
            // A failed batch leaves no partial lines behind
            if let Err(truncate_err) = Self::truncate_to(&mut file, start).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %truncate_err,
                    "Failed to roll back partial append"
                );
            }
            return Err(StorageError::WriteFailed(format!("{}: {}", path.display(), e)));
        }

        Ok(records.len())
    }
}
