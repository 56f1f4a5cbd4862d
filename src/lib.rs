// Quarry - Parallel analytics exporter
// Copyright (c) 2025 Quarry Contributors
// Licensed under the MIT License

//! # Quarry - parallel exporter for rate-limited analytics APIs
//!
//! Quarry pulls raw events and user profiles out of a remote analytics API
//! and writes them into a local store (PostgreSQL or JSON-lines files).
//!
//! ## Overview
//!
//! - **Planning** an export into independent work units: day ranges for
//!   events, pages for profiles
//! - **Fetching** units concurrently while staying under each API family's
//!   concurrency, per-second and per-hour ceilings
//! - **Writing** through a single writer fed by a bounded queue, so the
//!   destination never sees concurrent mutation
//! - **Reporting** per-unit outcomes, with failed units saved for a retry
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Export engine and record transformation
//! - [`adapters`] - Analytics API client and storage sinks
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry::config::load_config;
//! use quarry::core::export::{ExportCoordinator, ExportOverrides};
//! use quarry::domain::{DestinationName, ExportRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("quarry.toml")?;
//!     let coordinator = ExportCoordinator::new(config)?;
//!
//!     let request = ExportRequest::profiles(DestinationName::new("profiles")?);
//!     let outcome = coordinator.execute(request, &ExportOverrides::default()).await?;
//!
//!     println!("Exported {} profiles", outcome.result.total_rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Driving the engine directly
//!
//! [`core::export::ParallelFetchEngine`] only needs a
//! [`adapters::analytics::FetchClient`] and a
//! [`adapters::database::StorageSink`], which makes it easy to run against
//! fakes:
//!
//! ```rust,no_run
//! use quarry::adapters::analytics::FetchClient;
//! use quarry::adapters::database::DryRunSink;
//! use quarry::core::export::{ApiLimits, ParallelFetchEngine, RunOptions};
//! use quarry::domain::{DestinationName, ExportRequest};
//! use std::sync::Arc;
//!
//! # async fn example(fetcher: Arc<dyn FetchClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ParallelFetchEngine::new(fetcher, ApiLimits::default());
//! let request = ExportRequest::profiles(DestinationName::new("profiles")?);
//! let options = RunOptions::default().with_max_workers(5).with_dry_run(true);
//!
//! let result = engine
//!     .run(request, options, Box::new(DryRunSink::new()), None)
//!     .await?;
//! println!("{:.1}% of units succeeded", result.success_rate());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`], whose error is [`domain::QuarryError`].
//! A run only fails as a whole for planning and discovery errors; everything
//! else is recorded per unit in the result.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
