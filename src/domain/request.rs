//! Export requests

use super::ids::DestinationName;
use super::record::RecordKind;
use super::unit::UnitDescriptor;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Filters forwarded to the remote API unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuery {
    /// Event names to export (empty = all events)
    #[serde(default)]
    pub events: Vec<String>,

    /// Remote-side filter expression
    #[serde(default)]
    pub where_clause: Option<String>,
}

/// What part of the remote dataset to export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ExportScope {
    /// Events between two days, inclusive
    Events { from: NaiveDate, to: NaiveDate },
    /// All profiles, paginated by count
    Profiles,
    /// Exactly these units, typically the failures of an earlier run
    Units { units: Vec<UnitDescriptor> },
}

impl ExportScope {
    /// Record kind this scope produces, if it can be determined
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            ExportScope::Events { .. } => Some(RecordKind::Event),
            ExportScope::Profiles => Some(RecordKind::Profile),
            ExportScope::Units { units } => match units.first() {
                Some(UnitDescriptor::Range(_)) => Some(RecordKind::Event),
                Some(UnitDescriptor::Page(_)) => Some(RecordKind::Profile),
                None => None,
            },
        }
    }

    /// Whether units of this scope are pages that need a discovery fetch
    pub fn is_paginated(&self) -> bool {
        self.record_kind() == Some(RecordKind::Profile)
    }
}

/// A complete export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub destination: DestinationName,
    pub scope: ExportScope,
    pub query: SourceQuery,
}

impl ExportRequest {
    pub fn events(destination: DestinationName, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            destination,
            scope: ExportScope::Events { from, to },
            query: SourceQuery::default(),
        }
    }

    pub fn profiles(destination: DestinationName) -> Self {
        Self {
            destination,
            scope: ExportScope::Profiles,
            query: SourceQuery::default(),
        }
    }

    pub fn units(destination: DestinationName, units: Vec<UnitDescriptor>) -> Self {
        Self {
            destination,
            scope: ExportScope::Units { units },
            query: SourceQuery::default(),
        }
    }

    pub fn with_query(mut self, query: SourceQuery) -> Self {
        self.query = query;
        self
    }
}
