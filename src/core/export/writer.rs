//! Write queue and the single writer
//!
//! Workers hold only a [`WriteQueue`]; the [`Writer`] owns the one
//! [`StorageSink`] of the run and is the only code that can mutate the
//! destination. The queue is a bounded tokio mpsc channel: a full queue makes
//! workers wait, and the channel closing (every sender dropped) tells the
//! writer the run has no more batches.

use super::aggregator::{FailureStage, ResultAggregator};
use crate::adapters::database::StorageSink;
use crate::domain::{Batch, DestinationName, StorageError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How the writer treats an existing destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// The destination must not exist; the first write creates it
    #[default]
    Create,
    /// The destination may exist; writes append (used for retries)
    Append,
}

/// Producer side of the bounded write queue
#[derive(Debug, Clone)]
pub struct WriteQueue {
    tx: mpsc::Sender<Batch>,
}

impl WriteQueue {
    /// Create a queue holding at most `capacity` batches
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Push a batch, waiting while the queue is full
    ///
    /// Gives the batch back if the writer has already stopped.
    pub async fn enqueue(&self, batch: Batch) -> Result<(), Batch> {
        self.tx.send(batch).await.map_err(|e| e.0)
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Counters reported by the writer when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub batches_written: usize,
    pub batches_failed: usize,
    /// Rows the sink reports as stored; may be lower than batch sizes when
    /// the store skips ids it already holds
    pub rows_written: usize,
}

/// Sole consumer of the write queue and sole owner of the sink
pub struct Writer {
    sink: Box<dyn StorageSink>,
    destination: DestinationName,
    mode: WriteMode,
    created: bool,
    aggregator: Arc<ResultAggregator>,
    stats: WriterStats,
}

impl Writer {
    pub fn new(
        sink: Box<dyn StorageSink>,
        destination: DestinationName,
        mode: WriteMode,
        aggregator: Arc<ResultAggregator>,
    ) -> Self {
        Self {
            sink,
            destination,
            mode,
            created: false,
            aggregator,
            stats: WriterStats::default(),
        }
    }

    /// Run the writer on its own task
    pub fn spawn(self, rx: mpsc::Receiver<Batch>) -> JoinHandle<WriterStats> {
        tokio::spawn(self.run(rx))
    }

    /// Drain the queue in arrival order until every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<Batch>) -> WriterStats {
        tracing::debug!(
            destination = %self.destination,
            sink = self.sink.kind(),
            mode = ?self.mode,
            "Writer started"
        );

        while let Some(batch) = rx.recv().await {
            let unit_index = batch.unit_index;
            match self.write_batch(&batch).await {
                Ok(stored) => {
                    self.stats.batches_written += 1;
                    self.stats.rows_written += stored;
                    tracing::debug!(
                        unit_index,
                        rows = batch.row_count,
                        stored,
                        unit = %batch.descriptor,
                        "Batch written"
                    );
                    self.aggregator.record_success(unit_index, batch.row_count);
                }
                Err(e) => {
                    self.stats.batches_failed += 1;
                    tracing::error!(
                        unit_index,
                        unit = %batch.descriptor,
                        error = %e,
                        "Batch write failed"
                    );
                    self.aggregator
                        .record_failure(unit_index, FailureStage::Write, e.to_string());
                }
            }
        }

        tracing::debug!(
            batches_written = self.stats.batches_written,
            batches_failed = self.stats.batches_failed,
            rows = self.stats.rows_written,
            "Write queue drained, writer exiting"
        );
        self.stats
    }

    async fn write_batch(&mut self, batch: &Batch) -> Result<usize, StorageError> {
        if !self.created && self.mode == WriteMode::Append {
            self.created = self.sink.exists(&self.destination).await?;
        }

        if self.created {
            self.sink.append(&self.destination, &batch.records).await
        } else {
            let rows = self.sink.create(&self.destination, &batch.records).await?;
            self.created = true;
            tracing::info!(destination = %self.destination, "Destination created");
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::DryRunSink;
    use crate::domain::{PageIndex, UnitDescriptor, UnitStatus, WorkUnit};

    fn page_units(n: u64) -> Vec<WorkUnit> {
        (0..n)
            .map(|p| WorkUnit::new(p as usize, UnitDescriptor::Page(PageIndex { page: p })))
            .collect()
    }

    #[tokio::test]
    async fn test_writer_drains_until_queue_closes() {
        let units = page_units(3);
        let aggregator = Arc::new(ResultAggregator::new(&units, None));
        let (queue, rx) = WriteQueue::bounded(2);
        let writer = Writer::new(
            Box::new(DryRunSink::new()),
            DestinationName::new("profiles").unwrap(),
            WriteMode::Create,
            aggregator.clone(),
        );
        let handle = writer.spawn(rx);

        for unit in &units {
            aggregator.transition(unit.index, UnitStatus::Queued);
            queue
                .enqueue(Batch::new(unit.index, unit.descriptor, Vec::new()))
                .await
                .unwrap();
        }
        drop(queue);

        let stats = handle.await.unwrap();
        assert_eq!(stats.batches_written, 3);
        assert_eq!(aggregator.status(2), Some(UnitStatus::Written));
    }

    #[tokio::test]
    async fn test_enqueue_returns_batch_when_writer_gone() {
        let (queue, rx) = WriteQueue::bounded(1);
        drop(rx);

        let batch = Batch::new(0, UnitDescriptor::Page(PageIndex { page: 0 }), Vec::new());
        let returned = queue.enqueue(batch).await.unwrap_err();
        assert_eq!(returned.unit_index, 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (queue, _rx) = WriteQueue::bounded(0);
        assert_eq!(queue.available(), 1);
    }
}
