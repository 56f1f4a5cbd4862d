//! Wire models for the analytics APIs

use serde::Deserialize;
use serde_json::Value;

/// Response body of the engage (profiles) endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EngageResponse {
    #[serde(default)]
    pub page: u64,

    #[serde(default)]
    pub page_size: u64,

    /// Continuation token for pages after the first
    #[serde(default)]
    pub session_id: Option<String>,

    /// Total profiles matching the query; only reliable on page 0
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub results: Vec<Value>,

    /// Set by the API when the request was accepted but failed
    #[serde(default)]
    pub error: Option<String>,
}
