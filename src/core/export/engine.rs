//! Parallel fetch engine
//!
//! [`ParallelFetchEngine::run`] plans a request into work units, fetches them
//! concurrently under the API family's rate limits, funnels every batch
//! through one writer task, and returns an [`AggregateResult`].
//!
//! Only planning errors and a failed discovery fetch are returned as `Err`.
//! Every other failure is recorded per unit in the result, which callers
//! inspect with [`AggregateResult::has_failures`].
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry::adapters::database::DryRunSink;
//! use quarry::adapters::analytics::FetchClient;
//! use quarry::core::export::{ApiLimits, ParallelFetchEngine, RunOptions};
//! use quarry::domain::{DestinationName, ExportRequest};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # async fn example(fetcher: Arc<dyn FetchClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ParallelFetchEngine::new(fetcher, ApiLimits::default());
//! let request = ExportRequest::events(
//!     DestinationName::new("events_jan")?,
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
//! );
//!
//! let result = engine
//!     .run(request, RunOptions::default(), Box::new(DryRunSink::new()), None)
//!     .await?;
//! if result.has_failures() {
//!     println!("retry these: {:?}", result.failed_unit_descriptors);
//! }
//! # Ok(())
//! # }
//! ```

use super::aggregator::{AggregateResult, FailureStage, ProgressCallback, ResultAggregator};
use super::planner::{Plan, WorkUnitPlanner};
use super::pool::{WorkerContext, WorkerPool};
use super::rate_limit::{effective_workers, ApiLimits, RateLimiter};
use super::writer::{WriteMode, WriteQueue, Writer};
use crate::adapters::analytics::{FetchClient, FetchedPage, PageInfo};
use crate::adapters::database::StorageSink;
use crate::core::transform::{normalize_all, RecordFormat};
use crate::domain::{
    Batch, ExportRequest, ExportScope, PageIndex, QuarryError, RecordKind, Result, SourceError,
    SourceQuery, UnitDescriptor, UnitStatus, WorkUnit,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Per-run knobs
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum days per event unit
    pub chunk_days: u32,
    /// Requested workers, clamped to the API family's ceiling
    pub max_workers: usize,
    /// Write queue capacity; defaults to twice the effective worker count
    pub queue_capacity: Option<usize>,
    pub write_mode: WriteMode,
    pub format: RecordFormat,
    /// Marks the result as a dry run; the caller supplies a non-writing sink
    pub dry_run: bool,
    /// Flipping this to `true` stops workers from claiming new units
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            chunk_days: 7,
            max_workers: 10,
            queue_capacity: None,
            write_mode: WriteMode::Create,
            format: RecordFormat::Preserve,
            dry_run: false,
            shutdown: None,
        }
    }
}

impl RunOptions {
    pub fn with_chunk_days(mut self, chunk_days: u32) -> Self {
        self.chunk_days = chunk_days;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

/// Result of the synchronous first fetch of a paginated export
struct Discovery {
    page: FetchedPage,
    info: PageInfo,
}

/// Orchestrates planner, worker pool, writer and aggregator for one run at a time
pub struct ParallelFetchEngine {
    fetcher: Arc<dyn FetchClient>,
    limits: ApiLimits,
}

impl ParallelFetchEngine {
    pub fn new(fetcher: Arc<dyn FetchClient>, limits: ApiLimits) -> Self {
        Self { fetcher, limits }
    }

    pub fn limits(&self) -> &ApiLimits {
        &self.limits
    }

    /// Export `request` into `sink`
    ///
    /// The sink is moved into the writer task and is never reachable from
    /// the workers.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::Planning`] for invalid parameters, or when the
    ///   destination already exists in [`WriteMode::Create`]
    /// - [`QuarryError::Discovery`] when the first page of a paginated
    ///   export cannot be fetched
    pub async fn run(
        &self,
        request: ExportRequest,
        options: RunOptions,
        mut sink: Box<dyn StorageSink>,
        on_unit_complete: Option<ProgressCallback>,
    ) -> Result<AggregateResult> {
        let started = Instant::now();
        let destination = request.destination.clone();

        if options.max_workers == 0 {
            return Err(QuarryError::Planning(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        let kind = request.scope.record_kind().ok_or_else(|| {
            QuarryError::Planning("export request contains no units".to_string())
        })?;
        let planner = WorkUnitPlanner::new(options.chunk_days)?;

        if options.write_mode == WriteMode::Create {
            let exists = sink.exists(&destination).await.map_err(|e| {
                QuarryError::Planning(format!("cannot check destination '{destination}': {e}"))
            })?;
            if exists {
                return Err(QuarryError::Planning(format!(
                    "destination '{destination}' already exists; use append mode to add to it"
                )));
            }
        }

        let family = self.fetcher.family(kind);
        let policy = self.limits.for_family(family).clone();
        let workers = effective_workers(options.max_workers, family, &policy);
        let limiter = Arc::new(RateLimiter::new(policy));
        let query = Arc::new(request.query.clone());

        let (plan, discovery) = match &request.scope {
            ExportScope::Events { from, to } => (planner.plan_range(*from, *to)?, None),
            ExportScope::Profiles => {
                let discovery = self.discover(&query, &limiter).await?;
                let plan = planner.plan_pages(discovery.info.total, discovery.info.page_size)?;
                (plan, Some(discovery))
            }
            ExportScope::Units { units } => {
                let plan = planner.plan_units(units)?;
                let discovery = if kind == RecordKind::Profile {
                    Some(self.discover(&query, &limiter).await?)
                } else {
                    None
                };
                (plan, discovery)
            }
        };

        let capacity = options.queue_capacity.unwrap_or(workers * 2).max(1);
        tracing::info!(
            plan_id = %plan.id,
            destination = %destination,
            units = plan.len(),
            workers,
            queue_capacity = capacity,
            mode = ?options.write_mode,
            "Export plan ready"
        );

        let aggregator = Arc::new(ResultAggregator::new(&plan.units, on_unit_complete));
        let (queue, rx) = WriteQueue::bounded(capacity);
        let writer = Writer::new(
            sink,
            destination.clone(),
            options.write_mode,
            aggregator.clone(),
        )
        .spawn(rx);

        let continuation = discovery
            .as_ref()
            .and_then(|d| d.info.session_id.as_deref())
            .map(Arc::<str>::from);
        let remaining = match discovery {
            Some(discovery) => {
                self.queue_discovery_unit(
                    plan,
                    discovery.page,
                    kind,
                    options.format,
                    &aggregator,
                    &queue,
                )
                .await
            }
            None => plan.units,
        };

        let ctx = WorkerContext {
            fetcher: self.fetcher.clone(),
            limiter,
            aggregator: aggregator.clone(),
            queue,
            query,
            kind,
            format: options.format,
            continuation,
            shutdown: options.shutdown.clone(),
        };
        // Dropping the pool's context closes the queue once the last worker exits
        let outcome = WorkerPool::new(workers, remaining).run(ctx).await;

        match writer.await {
            Ok(stats) => tracing::debug!(rows = stats.rows_written, "Writer finished"),
            Err(e) => tracing::error!(error = %e, "Writer task failed"),
        }

        let result = aggregator.finish(
            destination.as_str(),
            started.elapsed(),
            outcome.interrupted,
            options.dry_run,
        );
        result.log_summary();
        Ok(result)
    }

    /// Fetch page 0 synchronously; its response sizes the rest of the plan
    async fn discover(&self, query: &SourceQuery, limiter: &RateLimiter) -> Result<Discovery> {
        let descriptor = UnitDescriptor::Page(PageIndex { page: 0 });

        let permit = limiter
            .acquire()
            .await
            .map_err(|e| QuarryError::Discovery(SourceError::ConnectionFailed(e.to_string())))?;
        let fetched = self.fetcher.fetch(query, &descriptor, None).await;
        permit.release();

        let page = fetched.map_err(|e| {
            tracing::error!(error = %e, "Discovery fetch failed");
            QuarryError::Discovery(e)
        })?;
        let info = page.pagination.clone().ok_or_else(|| {
            QuarryError::Discovery(SourceError::InvalidResponse(
                "first page carries no pagination metadata".to_string(),
            ))
        })?;

        tracing::info!(
            total = info.total,
            page_size = info.page_size,
            records = page.records.len(),
            "Discovery fetch complete"
        );
        Ok(Discovery { page, info })
    }

    /// Queue page 0 from the discovery response and return the units left for workers
    async fn queue_discovery_unit(
        &self,
        plan: Plan,
        page: FetchedPage,
        kind: RecordKind,
        format: RecordFormat,
        aggregator: &ResultAggregator,
        queue: &WriteQueue,
    ) -> Vec<WorkUnit> {
        let discovery_descriptor = UnitDescriptor::Page(PageIndex { page: 0 });
        let (resolved, remaining): (Vec<WorkUnit>, Vec<WorkUnit>) = plan
            .units
            .into_iter()
            .partition(|u| u.descriptor == discovery_descriptor);

        // A retry that doesn't include page 0 discards the discovery records
        let Some(unit) = resolved.into_iter().next() else {
            return remaining;
        };

        match normalize_all(&page.records, kind, format) {
            Ok(records) => {
                aggregator.transition(unit.index, UnitStatus::Queued);
                let batch = Batch::new(unit.index, unit.descriptor, records);
                if queue.enqueue(batch).await.is_err() {
                    aggregator.record_failure(
                        unit.index,
                        FailureStage::Write,
                        "writer stopped before batch could be queued",
                    );
                }
            }
            Err(e) => {
                aggregator.transition(unit.index, UnitStatus::Fetching);
                aggregator.record_failure(unit.index, FailureStage::Transform, e.to_string());
            }
        }

        remaining
    }
}
