//! Work units
//!
//! A work unit is a bounded slice of an export request: either an inclusive
//! span of days or one page of a count-paginated source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive span of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the span
    pub from: NaiveDate,
    /// Last day of the span (inclusive)
    pub to: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `to` before `from`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, String> {
        if to < from {
            return Err(format!("end date {to} is before start date {from}"));
        }
        Ok(Self { from, to })
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// True when the two spans share at least one day
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Zero-based page of a count-paginated source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageIndex {
    pub page: u64,
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.page)
    }
}

/// What a single unit covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitDescriptor {
    Range(DateRange),
    Page(PageIndex),
}

impl UnitDescriptor {
    pub fn as_range(&self) -> Option<&DateRange> {
        match self {
            UnitDescriptor::Range(range) => Some(range),
            UnitDescriptor::Page(_) => None,
        }
    }

    pub fn as_page(&self) -> Option<&PageIndex> {
        match self {
            UnitDescriptor::Page(page) => Some(page),
            UnitDescriptor::Range(_) => None,
        }
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitDescriptor::Range(range) => range.fmt(f),
            UnitDescriptor::Page(page) => page.fmt(f),
        }
    }
}

/// Lifecycle state of a work unit
///
/// `Pending -> Fetching -> {FetchFailed | Queued} -> {Written | WriteFailed}`.
/// The discovery unit goes straight from `Pending` to `Queued`, and units never
/// claimed before a shutdown go from `Pending` to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Fetching,
    FetchFailed,
    Queued,
    Written,
    WriteFailed,
    Cancelled,
}

impl UnitStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::FetchFailed
                | UnitStatus::Written
                | UnitStatus::WriteFailed
                | UnitStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the unit state machine
    pub fn can_transition_to(&self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Pending, Queued)
                | (Pending, Cancelled)
                | (Fetching, FetchFailed)
                | (Fetching, Queued)
                | (Queued, Written)
                | (Queued, WriteFailed)
        )
    }
}

/// A planned unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Position in the plan, unique within a run
    pub index: usize,
    pub descriptor: UnitDescriptor,
    pub status: UnitStatus,
}

impl WorkUnit {
    pub fn new(index: usize, descriptor: UnitDescriptor) -> Self {
        Self {
            index,
            descriptor,
            status: UnitStatus::Pending,
        }
    }
}
