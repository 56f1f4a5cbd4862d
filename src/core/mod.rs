//! Core business logic for Quarry.
//!
//! # Modules
//!
//! - [`export`] - Planning, rate limiting, the fetch worker pool, the single
//!   writer, result aggregation and end-to-end coordination
//! - [`transform`] - Raw record normalization (preserve and flatten formats)
//!
//! # Export Workflow
//!
//! 1. **Plan**: Split the request into date-range or page units
//! 2. **Discover** (profiles only): Fetch page 0 to learn the page count
//! 3. **Fetch**: Workers fetch units concurrently under the API's rate limits
//! 4. **Transform**: Normalize each unit's records into one batch
//! 5. **Write**: A single writer drains the bounded queue into the sink
//! 6. **Report**: Aggregate per-unit outcomes; save failed units for retry
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry::config::load_config;
//! use quarry::core::export::{ExportCoordinator, ExportOverrides};
//! use quarry::domain::{DestinationName, ExportRequest};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("quarry.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = ExportCoordinator::new(config)?.with_shutdown(shutdown_rx);
//!
//! let request = ExportRequest::events(
//!     DestinationName::new("events_jan")?,
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//! );
//! let outcome = coordinator.execute(request, &ExportOverrides::default()).await?;
//!
//! println!("Rows: {}", outcome.result.total_rows);
//! println!("Failed units: {}", outcome.result.failed_units);
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod transform;
