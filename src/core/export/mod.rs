//! Parallel fetch engine
//!
//! - [`planner`] splits a request into work units
//! - [`rate_limit`] enforces the per-API-family ceilings
//! - [`pool`] runs the fetch workers
//! - [`writer`] holds the bounded write queue and the single writer
//! - [`aggregator`] tracks unit outcomes into an [`AggregateResult`]
//! - [`engine`] wires them together for one run
//! - [`coordinator`] runs an engine from configuration
//! - [`failed_units`] saves and loads retry files

pub mod aggregator;
pub mod coordinator;
pub mod engine;
pub mod failed_units;
pub mod planner;
pub mod pool;
pub mod rate_limit;
pub mod writer;

pub use aggregator::{
    AggregateResult, BatchProgress, FailureStage, ProgressCallback, ResultAggregator,
    UnitFailure,
};
pub use coordinator::{ExportCoordinator, ExportOutcome, ExportOverrides};
pub use engine::{ParallelFetchEngine, RunOptions};
pub use failed_units::FailedUnitsFile;
pub use planner::{Plan, WorkUnitPlanner};
pub use pool::{PoolOutcome, WorkerContext, WorkerPool};
pub use rate_limit::{
    effective_workers, ApiFamily, ApiLimits, RateLimitError, RateLimitPolicy, RateLimiter,
    RatePermit,
};
pub use writer::{WriteMode, WriteQueue, Writer, WriterStats};
