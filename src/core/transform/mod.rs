//! Record transformation
//!
//! Turns raw API records into [`NormalizedRecord`]s. Two property layouts are
//! supported:
//!
//! - **Preserve**: properties keep the nesting returned by the API
//! - **Flatten**: nested objects become dotted keys (`plan.tier`) for easier querying
//!
//! Normalization is pure: no I/O, and the same raw record always produces the
//! same normalized record, including its id.

pub mod flatten;
pub mod normalize;

use crate::domain::{NormalizedRecord, QuarryError, RawRecord, RecordKind, Result};
use std::str::FromStr;

pub use normalize::{normalize_event, normalize_profile};

/// Property layout in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// Keep properties nested as returned by the API
    #[default]
    Preserve,
    /// Flatten nested objects into dotted keys
    Flatten,
}

impl FromStr for RecordFormat {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "preserve" | "preserved" => Ok(Self::Preserve),
            "flatten" | "flattened" => Ok(Self::Flatten),
            _ => Err(QuarryError::Configuration(format!(
                "Invalid record format: {s}. Expected 'preserve' or 'flatten'"
            ))),
        }
    }
}

/// Normalize one raw record of the given kind
///
/// # Errors
///
/// Returns [`QuarryError::Transform`] if the record is not a JSON object or
/// lacks its identifying field (event name, or distinct id for profiles).
///
/// # Examples
///
/// ```
/// use quarry::core::transform::{normalize, RecordFormat};
/// use quarry::domain::{RawRecord, RecordKind};
/// use serde_json::json;
///
/// let raw = RawRecord(json!({
///     "event": "Signup",
///     "properties": {"distinct_id": "u-1", "time": 1704067200, "$insert_id": "abc"}
/// }));
/// let record = normalize(&raw, RecordKind::Event, RecordFormat::Preserve).unwrap();
/// assert_eq!(record.id, "abc");
/// assert_eq!(record.event_name.as_deref(), Some("Signup"));
/// ```
pub fn normalize(
    raw: &RawRecord,
    kind: RecordKind,
    format: RecordFormat,
) -> Result<NormalizedRecord> {
    let mut record = match kind {
        RecordKind::Event => normalize_event(raw)?,
        RecordKind::Profile => normalize_profile(raw)?,
    };

    if format == RecordFormat::Flatten {
        record.properties = flatten::flatten_properties(&record.properties);
    }

    Ok(record)
}

/// Normalize every record of a unit, failing on the first bad one
pub fn normalize_all(
    raws: &[RawRecord],
    kind: RecordKind,
    format: RecordFormat,
) -> Result<Vec<NormalizedRecord>> {
    raws.iter().map(|raw| normalize(raw, kind, format)).collect()
}
