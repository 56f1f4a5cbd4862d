//! Logging
//!
//! Structured logging through `tracing`:
//! - Human-readable console output on stderr
//! - Optional JSON file output with daily or hourly rotation
//! - Level from configuration, overridable with `RUST_LOG`
//!
//! # Example
//!
//! ```no_run
//! use quarry::logging::init_logging;
//! use quarry::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(destination = "events_jan", "Export started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a unit that reached a failed state
///
/// # Example
///
/// ```no_run
/// use quarry::log_unit_failure;
///
/// log_unit_failure!(3, "2024-01-22..2024-01-28", "fetch", "Server error: 502");
/// ```
#[macro_export]
macro_rules! log_unit_failure {
    ($index:expr, $unit:expr, $stage:expr, $error:expr) => {
        tracing::warn!(
            unit_index = $index,
            unit = %$unit,
            stage = %$stage,
            error = %$error,
            "Unit failed"
        );
    };
}

/// Log a transport retry
///
/// # Example
///
/// ```no_run
/// use quarry::log_retry_attempt;
///
/// log_retry_attempt!("engage page 3", 2, 3, 1500u64, "Request timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($request:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            request = $request,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            error = %$reason,
            "Retrying request after error"
        );
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_without_subscriber() {
        log_unit_failure!(0, "page 0", "write", "disk full");
        log_retry_attempt!("export", 1, 3, 10u64, "timeout");
    }
}
