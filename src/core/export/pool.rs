//! Fetch worker pool
//!
//! N workers claim units from a shared queue. For each unit a worker acquires
//! a rate-limit permit, fetches, releases the permit, normalizes the records
//! and pushes the batch onto the write queue. A failed unit is reported to the
//! aggregator and the worker moves on; nothing is retried here.

use super::aggregator::{FailureStage, ResultAggregator};
use super::rate_limit::RateLimiter;
use super::writer::WriteQueue;
use crate::adapters::analytics::FetchClient;
use crate::core::transform::{normalize_all, RecordFormat};
use crate::domain::{Batch, RecordKind, SourceQuery, UnitStatus, WorkUnit};
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Everything a worker needs; deliberately no storage handle
#[derive(Clone)]
pub struct WorkerContext {
    pub fetcher: Arc<dyn FetchClient>,
    pub limiter: Arc<RateLimiter>,
    pub aggregator: Arc<ResultAggregator>,
    pub queue: WriteQueue,
    pub query: Arc<SourceQuery>,
    pub kind: RecordKind,
    pub format: RecordFormat,
    /// Session id from discovery, for paginated units
    pub continuation: Option<Arc<str>>,
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl WorkerContext {
    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// What the pool reports once every worker has exited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Units claimed by workers
    pub claimed: usize,
    /// Units never claimed because the run was stopped
    pub cancelled: usize,
    pub interrupted: bool,
}

/// Fixed-size pool of fetch workers
#[derive(Debug)]
pub struct WorkerPool {
    workers: usize,
    pending: Arc<Mutex<VecDeque<WorkUnit>>>,
}

impl WorkerPool {
    pub fn new(workers: usize, units: Vec<WorkUnit>) -> Self {
        Self {
            workers: workers.max(1),
            pending: Arc::new(Mutex::new(units.into())),
        }
    }

    /// Run all units to a terminal state, or until a stop is requested
    ///
    /// The context (and with it this pool's write-queue sender) is dropped
    /// when this returns.
    pub async fn run(self, ctx: WorkerContext) -> PoolOutcome {
        let unit_count = self.pending_len();
        let workers = self.workers.min(unit_count.max(1));
        tracing::debug!(workers, units = unit_count, "Starting fetch workers");

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let pending = self.pending.clone();
                tokio::spawn(async move { worker_loop(worker_id, ctx, pending).await })
            })
            .collect();

        let mut claimed = 0;
        for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(count) => claimed += count,
                Err(e) => tracing::error!(worker_id, error = %e, "Fetch worker panicked"),
            }
        }

        let interrupted = ctx.stop_requested();
        let cancelled = if interrupted {
            let cancelled = ctx.aggregator.cancel_pending();
            tracing::warn!(cancelled, "Run stopped, unclaimed units cancelled");
            cancelled
        } else {
            0
        };

        PoolOutcome {
            claimed,
            cancelled,
            interrupted,
        }
    }

    fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    pending: Arc<Mutex<VecDeque<WorkUnit>>>,
) -> usize {
    let mut processed = 0;
    loop {
        if ctx.stop_requested() {
            tracing::debug!(worker_id, "Stop requested, worker not claiming more units");
            break;
        }

        let next = pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(unit) = next else {
            break;
        };

        process_unit(&ctx, unit).await;
        processed += 1;
    }
    processed
}

async fn process_unit(ctx: &WorkerContext, unit: WorkUnit) {
    let index = unit.index;
    let descriptor = unit.descriptor;
    ctx.aggregator.transition(index, UnitStatus::Fetching);

    let permit = match ctx.limiter.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            ctx.aggregator
                .record_failure(index, FailureStage::Fetch, e.to_string());
            return;
        }
    };

    let fetched = ctx
        .fetcher
        .fetch(&ctx.query, &descriptor, ctx.continuation.as_deref())
        .await;
    // Never hold a rate-limit slot while waiting on the write queue
    permit.release();

    let page = match fetched {
        Ok(page) => page,
        Err(e) => {
            crate::log_unit_failure!(index, descriptor, "fetch", e);
            ctx.aggregator
                .record_failure(index, FailureStage::Fetch, e.to_string());
            return;
        }
    };

    let records = match normalize_all(&page.records, ctx.kind, ctx.format) {
        Ok(records) => records,
        Err(e) => {
            crate::log_unit_failure!(index, descriptor, "transform", e);
            ctx.aggregator
                .record_failure(index, FailureStage::Transform, e.to_string());
            return;
        }
    };

    let batch = Batch::new(index, descriptor, records);
    tracing::debug!(unit_index = index, rows = batch.row_count, "Unit fetched, queueing batch");

    // Queued before the send so the writer's outcome is always a legal transition
    ctx.aggregator.transition(index, UnitStatus::Queued);
    if ctx.queue.enqueue(batch).await.is_err() {
        ctx.aggregator.record_failure(
            index,
            FailureStage::Write,
            "writer stopped before batch could be queued",
        );
    }
}
