//! Domain models and types for Quarry.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Work units** ([`WorkUnit`], [`UnitDescriptor`], [`UnitStatus`])
//! - **Records** ([`RawRecord`], [`NormalizedRecord`], [`Batch`])
//! - **Requests** ([`ExportRequest`], [`ExportScope`], [`SourceQuery`])
//! - **Error types** ([`QuarryError`], [`SourceError`], [`StorageError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, QuarryError>`]:
//!
//! ```rust
//! use quarry::domain::{QuarryError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(QuarryError::Planning("chunk_days must be > 0".to_string()))
//! }
//! ```

pub mod context;
pub mod errors;
pub mod ids;
pub mod record;
pub mod request;
pub mod result;
pub mod unit;

pub use errors::{QuarryError, SourceError, StorageError};
pub use ids::DestinationName;
pub use record::{Batch, NormalizedRecord, RawRecord, RecordKind};
pub use request::{ExportRequest, ExportScope, SourceQuery};
pub use result::Result;
pub use unit::{DateRange, PageIndex, UnitDescriptor, UnitStatus, WorkUnit};
