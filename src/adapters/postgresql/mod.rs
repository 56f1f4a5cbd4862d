//! PostgreSQL destination
//!
//! Each export destination becomes one table in the configured schema.

pub mod client;
pub mod sink;

pub use client::PostgreSQLClient;
pub use sink::PostgreSQLSink;
