//! Domain error types
//!
//! This module defines the error hierarchy for Quarry. Only planning and
//! discovery failures ever escape an export run; per-unit fetch and write
//! failures are folded into the run's result instead.

use thiserror::Error;

/// Main Quarry error type
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid export request, raised before any fetching starts
    #[error("Planning error: {0}")]
    Planning(String),

    /// The discovery unit of a paginated export could not be fetched
    #[error("Discovery failed: {0}")]
    Discovery(#[source] SourceError),

    /// Remote analytics API errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Destination store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A raw record could not be normalized
    #[error("Transform error: {0}")]
    Transform(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Classified errors from the remote analytics API
///
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Credentials rejected (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Throttled by the remote API (429)
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than auth and throttling)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Failed to reach the remote API
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether the transport should retry the request with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. }
                | SourceError::ServerError { .. }
                | SourceError::Timeout(_)
                | SourceError::ConnectionFailed(_)
        )
    }
}

/// Destination store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Destination already exists and the run is not in append mode
    #[error("Destination already exists: {0}")]
    DestinationExists(String),

    /// Failed to connect to the store
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// Failed to create the destination
    #[error("Failed to create destination: {0}")]
    SchemaFailed(String),

    /// Failed to write a batch
    #[error("Failed to write batch: {0}")]
    WriteFailed(String),

    /// Destination name not usable by this store
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for QuarryError {
    fn from(err: toml::de::Error) -> Self {
        QuarryError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarry_error_display() {
        let err = QuarryError::Planning("end date before start date".to_string());
        assert_eq!(err.to_string(), "Planning error: end date before start date");
    }

    #[test]
    fn test_source_error_conversion() {
        let err: QuarryError = SourceError::Timeout("30s".to_string()).into();
        assert!(matches!(err, QuarryError::Source(_)));
    }

    #[test]
    fn test_discovery_wraps_source_error() {
        let err = QuarryError::Discovery(SourceError::Unauthorized("bad secret".to_string()));
        assert!(err.to_string().contains("Discovery failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: QuarryError = StorageError::DestinationExists("events".to_string()).into();
        assert!(matches!(err, QuarryError::Storage(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::RateLimited {
            retry_after_secs: Some(5)
        }
        .is_transient());
        assert!(SourceError::ServerError {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!SourceError::Unauthorized("nope".to_string()).is_transient());
        assert!(!SourceError::ClientError {
            status: 400,
            message: "bad where".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: QuarryError = io_err.into();
        assert!(matches!(err, QuarryError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: QuarryError = toml_err.into();
        assert!(err.to_string().contains("TOML parse error"));
    }
}
