//! Records and batches
//!
//! Raw records arrive from the analytics API as JSON objects; the transform
//! step turns each into a [`NormalizedRecord`] with a fixed set of columns,
//! and a worker hands all records of one unit to the writer as a [`Batch`].

use super::unit::UnitDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An untouched record as returned by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Value);

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Kind of data an export produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Event,
    Profile,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Event => "event",
            RecordKind::Profile => "profile",
        }
    }
}

/// A record in the destination schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Stable identifier; identical across re-fetches of the same record
    pub id: String,
    pub kind: RecordKind,
    /// Event name (events only)
    pub event_name: Option<String>,
    pub distinct_id: Option<String>,
    /// Event time, or last-seen time for profiles
    pub event_time: Option<DateTime<Utc>>,
    /// Remaining properties, nested or flattened depending on the record format
    pub properties: Value,
}

/// All normalized records of one work unit, on their way to the writer
#[derive(Debug, Clone)]
pub struct Batch {
    pub unit_index: usize,
    pub descriptor: UnitDescriptor,
    pub records: Vec<NormalizedRecord>,
    pub row_count: usize,
}

impl Batch {
    pub fn new(
        unit_index: usize,
        descriptor: UnitDescriptor,
        records: Vec<NormalizedRecord>,
    ) -> Self {
        let row_count = records.len();
        Self {
            unit_index,
            descriptor,
            records,
            row_count,
        }
    }
}
