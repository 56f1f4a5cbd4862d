//! Storage abstraction layer
//!
//! This module defines the [`StorageSink`] trait that destination stores
//! implement, a [`DryRunSink`], and the [`create_sink`] factory.

pub mod dry_run;
pub mod factory;
pub mod traits;

pub use dry_run::DryRunSink;
pub use factory::create_sink;
pub use traits::StorageSink;
