//! Re-running failed units through a saved failed-units file

mod common;

use common::{date, destination, fast_limits, range, MemorySink, ScriptedFetcher};
use quarry::core::export::{FailedUnitsFile, ParallelFetchEngine, RunOptions, WriteMode};
use quarry::domain::{ExportRequest, PageIndex, RecordKind, SourceQuery, UnitDescriptor};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_retry_fills_the_gap_left_by_failed_units() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.failed_units.json");
    let failed = range("2024-01-15", "2024-01-21");

    let (sink, store) = MemorySink::new();
    let first = ParallelFetchEngine::new(
        Arc::new(ScriptedFetcher::events(2).failing(failed)),
        fast_limits(),
    );
    let result = first
        .run(
            ExportRequest::events(destination("events"), date("2024-01-01"), date("2024-01-30")),
            RunOptions::default().with_chunk_days(7),
            Box::new(sink),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.total_rows, 46);

    FailedUnitsFile::new(
        &destination("events"),
        RecordKind::Event,
        SourceQuery::default(),
        result.failed_unit_descriptors.clone(),
    )
    .save(&path)
    .unwrap();

    let file = FailedUnitsFile::load(&path).unwrap();
    assert_eq!(file.units, vec![failed]);

    let retry_fetcher = Arc::new(ScriptedFetcher::events(2));
    let retry = ParallelFetchEngine::new(retry_fetcher.clone(), fast_limits());
    let retried = retry
        .run(
            file.to_request(destination("events")),
            RunOptions::default().with_write_mode(WriteMode::Append),
            Box::new(MemorySink::shared(store.clone())),
            None,
        )
        .await
        .unwrap();

    assert_eq!(retried.total_units, 1);
    assert_eq!(retried.failed_units, 0);
    assert_eq!(retried.total_rows, 14);
    assert_eq!(retry_fetcher.calls().len(), 1);
    assert_eq!(store.lock().unwrap().rows("events"), 60);
}

#[tokio::test]
async fn test_rerunning_succeeded_units_adds_no_rows() {
    let (sink, store) = MemorySink::new();
    let request =
        || ExportRequest::events(destination("events"), date("2024-04-01"), date("2024-04-10"));

    let engine = ParallelFetchEngine::new(Arc::new(ScriptedFetcher::events(3)), fast_limits());
    engine
        .run(request(), RunOptions::default(), Box::new(sink), None)
        .await
        .unwrap();
    assert_eq!(store.lock().unwrap().rows("events"), 30);

    let again = engine
        .run(
            request(),
            RunOptions::default().with_write_mode(WriteMode::Append),
            Box::new(MemorySink::shared(store.clone())),
            None,
        )
        .await
        .unwrap();

    assert_eq!(again.failed_units, 0);
    assert_eq!(store.lock().unwrap().rows("events"), 30);
}

#[tokio::test]
async fn test_retry_of_a_later_page_rediscovers_session() {
    let page = |page| UnitDescriptor::Page(PageIndex { page });
    let (sink, store) = MemorySink::new();

    let first = ParallelFetchEngine::new(
        Arc::new(ScriptedFetcher::profiles(2500, 1000).failing(page(2))),
        fast_limits(),
    );
    let result = first
        .run(
            ExportRequest::profiles(destination("profiles")),
            RunOptions::default(),
            Box::new(sink),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.failed_unit_descriptors, vec![page(2)]);
    assert_eq!(store.lock().unwrap().rows("profiles"), 2000);

    let file = FailedUnitsFile::new(
        &destination("profiles"),
        RecordKind::Profile,
        SourceQuery::default(),
        result.failed_unit_descriptors,
    );

    let retry_fetcher = Arc::new(ScriptedFetcher::profiles(2500, 1000));
    let retry = ParallelFetchEngine::new(retry_fetcher.clone(), fast_limits());
    let retried = retry
        .run(
            file.to_request(destination("profiles")),
            RunOptions::default().with_write_mode(WriteMode::Append),
            Box::new(MemorySink::shared(store.clone())),
            None,
        )
        .await
        .unwrap();

    assert_eq!(retried.total_units, 1);
    assert_eq!(retried.total_rows, 500);
    assert_eq!(store.lock().unwrap().rows("profiles"), 2500);

    // Discovery runs again for the session, but its records are not written
    let calls = retry_fetcher.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], (page(0), None));
    assert_eq!(calls[1], (page(2), Some("session-1".to_string())));
}

#[test]
fn test_failed_units_file_rejects_empty_unit_list() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(
        &path,
        r#"{"destination":"events","scope_kind":"event","query":{},"units":[],"created_at":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    assert!(FailedUnitsFile::load(&path).is_err());
}
