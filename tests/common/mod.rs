//! Shared fakes for engine integration tests
//!
//! - [`ScriptedFetcher`] serves deterministic events and profiles, fails
//!   chosen units, and records how it was called
//! - [`MemorySink`] keeps destinations in memory, keyed by record id, so
//!   re-written rows are skipped like the PostgreSQL sink's `ON CONFLICT`

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use quarry::adapters::analytics::{FetchClient, FetchedPage, PageInfo};
use quarry::adapters::database::StorageSink;
use quarry::core::export::{ApiLimits, RateLimitPolicy};
use quarry::domain::{
    DateRange, DestinationName, NormalizedRecord, RawRecord, SourceError, SourceQuery,
    StorageError, UnitDescriptor,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn range(from: &str, to: &str) -> UnitDescriptor {
    UnitDescriptor::Range(DateRange::new(date(from), date(to)).unwrap())
}

pub fn destination(name: &str) -> DestinationName {
    DestinationName::new(name).unwrap()
}

/// Limits without time windows so tests never wait on the clock
pub fn fast_limits() -> ApiLimits {
    ApiLimits {
        export: RateLimitPolicy::concurrency_only(100),
        query: RateLimitPolicy::concurrency_only(5),
    }
}

/// Counts batches that exist but haven't been written yet
#[derive(Debug, Default)]
pub struct Backlog {
    started: AtomicUsize,
    written: AtomicUsize,
    peak: AtomicUsize,
}

impl Backlog {
    pub fn fetch_started(&self) {
        let started = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let outstanding = started.saturating_sub(self.written.load(Ordering::SeqCst));
        self.peak.fetch_max(outstanding, Ordering::SeqCst);
    }

    pub fn batch_written(&self) {
        self.written.fetch_add(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

type FetchHook = Box<dyn Fn(&UnitDescriptor) + Send + Sync>;

enum Source {
    Events { per_day: usize },
    Profiles { total: u64, page_size: u64 },
}

/// Deterministic in-memory analytics API
pub struct ScriptedFetcher {
    source: Source,
    failing: HashSet<UnitDescriptor>,
    malformed: HashSet<UnitDescriptor>,
    delay: Option<Duration>,
    on_fetch: Option<FetchHook>,
    backlog: Option<Arc<Backlog>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<(UnitDescriptor, Option<String>)>>,
}

impl ScriptedFetcher {
    /// `per_day` events for every day of a range
    pub fn events(per_day: usize) -> Self {
        Self::new(Source::Events { per_day })
    }

    /// `total` profiles served `page_size` at a time
    pub fn profiles(total: u64, page_size: u64) -> Self {
        Self::new(Source::Profiles { total, page_size })
    }

    fn new(source: Source) -> Self {
        Self {
            source,
            failing: HashSet::new(),
            malformed: HashSet::new(),
            delay: None,
            on_fetch: None,
            backlog: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fetching `descriptor` returns a server error
    pub fn failing(mut self, descriptor: UnitDescriptor) -> Self {
        self.failing.insert(descriptor);
        self
    }

    /// `descriptor` returns a record that can't be normalized
    pub fn malformed(mut self, descriptor: UnitDescriptor) -> Self {
        self.malformed.insert(descriptor);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Run `hook` as each fetch starts
    pub fn on_fetch(mut self, hook: impl Fn(&UnitDescriptor) + Send + Sync + 'static) -> Self {
        self.on_fetch = Some(Box::new(hook));
        self
    }

    pub fn with_backlog(mut self, backlog: Arc<Backlog>) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(UnitDescriptor, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, descriptor: &UnitDescriptor) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == descriptor)
            .count()
    }

    /// Rows a unit yields when it succeeds
    pub fn rows_for(&self, descriptor: &UnitDescriptor) -> usize {
        match (&self.source, descriptor) {
            (Source::Events { per_day }, UnitDescriptor::Range(r)) => r.days() as usize * per_day,
            (Source::Profiles { total, page_size }, UnitDescriptor::Page(p)) => {
                let start = p.page * page_size;
                total.saturating_sub(start).min(*page_size) as usize
            }
            _ => 0,
        }
    }

    fn records_for(&self, descriptor: &UnitDescriptor) -> Vec<RawRecord> {
        match (&self.source, descriptor) {
            (Source::Events { per_day }, UnitDescriptor::Range(r)) => {
                let mut records = Vec::new();
                for offset in 0..r.days() as u64 {
                    let day = r.from.checked_add_days(Days::new(offset)).unwrap();
                    let time = day.and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp();
                    for n in 0..*per_day {
                        records.push(RawRecord(json!({
                            "event": "Page View",
                            "properties": {
                                "$insert_id": format!("{day}-{n}"),
                                "distinct_id": format!("user-{n}"),
                                "time": time,
                                "page": format!("/docs/{n}")
                            }
                        })));
                    }
                }
                records
            }
            (Source::Profiles { page_size, .. }, UnitDescriptor::Page(p)) => {
                let start = p.page * page_size;
                (0..self.rows_for(descriptor) as u64)
                    .map(|i| {
                        RawRecord(json!({
                            "$distinct_id": format!("user-{}", start + i),
                            "$properties": {"$name": format!("User {}", start + i), "plan": "pro"}
                        }))
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn pagination(&self) -> Option<PageInfo> {
        match self.source {
            Source::Profiles { total, page_size } => Some(PageInfo {
                total,
                page_size,
                session_id: Some("session-1".to_string()),
            }),
            Source::Events { .. } => None,
        }
    }
}

#[async_trait]
impl FetchClient for ScriptedFetcher {
    async fn fetch(
        &self,
        _query: &SourceQuery,
        descriptor: &UnitDescriptor,
        continuation: Option<&str>,
    ) -> Result<FetchedPage, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((*descriptor, continuation.map(str::to_string)));
        if let Some(ref hook) = self.on_fetch {
            hook(descriptor);
        }
        if let Some(ref backlog) = self.backlog {
            backlog.fetch_started();
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(descriptor) {
            return Err(SourceError::ServerError {
                status: 503,
                message: format!("{descriptor} unavailable"),
            });
        }

        let records = if self.malformed.contains(descriptor) {
            vec![RawRecord(json!({"properties": {"time": 0}}))]
        } else {
            self.records_for(descriptor)
        };
        let page = FetchedPage::new(records);
        Ok(match self.pagination() {
            Some(info) => page.with_pagination(info),
            None => page,
        })
    }
}

/// Destinations held by a [`MemorySink`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub tables: HashMap<String, BTreeMap<String, NormalizedRecord>>,
    pub creates: usize,
    pub appends: usize,
}

impl MemoryStore {
    pub fn rows(&self, destination: &str) -> usize {
        self.tables.get(destination).map_or(0, BTreeMap::len)
    }
}

pub type SharedStore = Arc<Mutex<MemoryStore>>;

/// In-memory sink; clones of the store can be inspected after the run
pub struct MemorySink {
    store: SharedStore,
    poison_ids: HashSet<String>,
    write_delay: Option<Duration>,
    backlog: Option<Arc<Backlog>>,
}

impl MemorySink {
    pub fn new() -> (Self, SharedStore) {
        let store = SharedStore::default();
        (Self::shared(store.clone()), store)
    }

    /// Sink writing into an existing store
    pub fn shared(store: SharedStore) -> Self {
        Self {
            store,
            poison_ids: HashSet::new(),
            write_delay: None,
            backlog: None,
        }
    }

    /// Any batch containing `id` fails to write
    pub fn failing_on(mut self, id: &str) -> Self {
        self.poison_ids.insert(id.to_string());
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_backlog(mut self, backlog: Arc<Backlog>) -> Self {
        self.backlog = Some(backlog);
        self
    }

    async fn write(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
        create: bool,
    ) -> Result<usize, StorageError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref backlog) = self.backlog {
            backlog.batch_written();
        }
        if records.iter().any(|r| self.poison_ids.contains(&r.id)) {
            return Err(StorageError::WriteFailed("disk full".to_string()));
        }

        let mut store = self.store.lock().unwrap();
        let name = destination.as_str().to_string();
        if create {
            if store.tables.contains_key(&name) {
                return Err(StorageError::DestinationExists(name));
            }
            store.creates += 1;
            store.tables.insert(name.clone(), BTreeMap::new());
        } else {
            store.appends += 1;
        }

        let table = store
            .tables
            .get_mut(&name)
            .ok_or_else(|| StorageError::WriteFailed(format!("{name} does not exist")))?;
        let mut inserted = 0;
        for record in records {
            if !table.contains_key(&record.id) {
                table.insert(record.id.clone(), record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn exists(&mut self, destination: &DestinationName) -> Result<bool, StorageError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .tables
            .contains_key(destination.as_str()))
    }

    async fn create(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError> {
        self.write(destination, records, true).await
    }

    async fn append(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> Result<usize, StorageError> {
        self.write(destination, records, false).await
    }
}
