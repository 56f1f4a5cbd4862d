//! Error context extension trait
//!
//! Adds `.context()` and `.with_context()` to any `Result` whose error converts
//! into [`QuarryError`], so library code can attach context without leaving
//! the domain error type.
//!
//! ```rust
//! use quarry::domain::Result;
//! use quarry::domain::context::ResultExt;
//!
//! fn read_units(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_context(|| format!("Failed to read failed-units file: {}", path))
//! }
//! ```

use crate::domain::errors::QuarryError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error (evaluated eagerly)
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, computing it only on failure
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<QuarryError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| wrap(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

// Keeps the variant for errors callers dispatch on (exit codes depend on it)
fn wrap(error: QuarryError, context: impl std::fmt::Display) -> QuarryError {
    match error {
        QuarryError::Configuration(msg) => QuarryError::Configuration(format!("{context}: {msg}")),
        QuarryError::Planning(msg) => QuarryError::Planning(format!("{context}: {msg}")),
        other => QuarryError::Other(format!("{context}: {other}")),
    }
}
