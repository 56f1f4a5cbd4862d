//! Fetch client trait
//!
//! The engine only ever talks to the remote API through [`FetchClient`], so it
//! can be driven by the HTTP client in production and by scripted fakes in tests.

use crate::core::export::ApiFamily;
use crate::domain::{RawRecord, RecordKind, SourceError, SourceQuery, UnitDescriptor};
use async_trait::async_trait;

/// Pagination metadata revealed by the discovery fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Total records matching the query
    pub total: u64,
    /// Records per page
    pub page_size: u64,
    /// Continuation token every later page must send
    pub session_id: Option<String>,
}

/// Records returned for one unit
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub records: Vec<RawRecord>,
    /// Present on paginated responses
    pub pagination: Option<PageInfo>,
}

impl FetchedPage {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            pagination: None,
        }
    }

    pub fn with_pagination(mut self, pagination: PageInfo) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// Remote fetch collaborator
///
/// Implementations classify failures into [`SourceError`] and may retry
/// transient failures internally; the engine never re-fetches a unit.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// API family serving records of `kind`, which selects the rate limits
    fn family(&self, kind: RecordKind) -> ApiFamily {
        ApiFamily::for_kind(kind)
    }

    /// Fetch every record of one unit
    ///
    /// `continuation` is the session id from discovery, for paginated units.
    async fn fetch(
        &self,
        query: &SourceQuery,
        descriptor: &UnitDescriptor,
        continuation: Option<&str>,
    ) -> Result<FetchedPage, SourceError>;
}
