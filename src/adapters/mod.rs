//! External system integrations for Quarry.
//!
//! - [`analytics`] - Remote analytics API (raw event export and profile engage endpoints)
//! - [`database`] - Storage sink abstraction, factory and dry-run sink
//! - [`postgresql`] - PostgreSQL sink
//! - [`jsonl`] - JSON-lines file sink
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the export engine
//! can be driven by scripted fakes in tests. The engine only sees
//! [`analytics::FetchClient`] and [`database::StorageSink`].
//!
//! ```rust,no_run
//! use quarry::adapters::analytics::AnalyticsClient;
//! use quarry::adapters::database::create_sink;
//! use quarry::config::load_config;
//!
//! # async fn example() -> quarry::domain::Result<()> {
//! let config = load_config("quarry.toml")?;
//! let client = AnalyticsClient::new(config.source.clone())?;
//! let sink = create_sink(&config, false).await?;
//! println!("writing to {}", sink.kind());
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod database;
pub mod jsonl;
pub mod postgresql;
