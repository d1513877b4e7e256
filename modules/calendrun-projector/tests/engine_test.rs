//! Engine behaviour against the in-memory event source. No network, no
//! database.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use calendrun_common::EventKey;
use calendrun_projector::testing::{bucket, page, raw_event, MockEventSource, RecordingHandler};
use calendrun_projector::{
    DispatchRegistry, ErrorClass, ProjectionEngine, SourceError, UnitOutcome,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt;
use serde_json::json;

const RUN: &str = "run.0";
const LOGGED: &str = "run.logged.0";
const USER: &str = "user.0";
const USER_CREATED: &str = "user.created.0";

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 7, h, m, s).unwrap()
}

fn logged_key() -> EventKey {
    EventKey::new(RUN, LOGGED)
}

fn run_event(id: &str) -> flowcore_client::RawEvent {
    raw_event(id, RUN, LOGGED, json!({"distanceKm": 5}))
}

fn engine_with(source: &Arc<MockEventSource>, handler: RecordingHandler, page_size: u32) -> ProjectionEngine {
    let registry = DispatchRegistry::new().with(RUN, LOGGED, handler);
    ProjectionEngine::new(source.clone(), Arc::new(registry), page_size)
}

// ---------------------------------------------------------------------------
// Unit algorithm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_are_applied_in_page_order() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &b,
        None,
        page(vec![run_event("e1"), run_event("e2"), run_event("e3")], None),
    ));
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 500);

    let report = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(handler.applied(), vec!["e1", "e2", "e3"]);
    assert_eq!(report.processed, 3);
    assert_eq!(report.outcome, UnitOutcome::Completed);
}

#[tokio::test]
async fn poison_event_does_not_abort_the_page() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &b,
        None,
        page(vec![run_event("e1"), run_event("e2"), run_event("e3")], None),
    ));
    let handler = RecordingHandler::new().failing_on("e2");
    let mut engine = engine_with(&source, handler.clone(), 500);

    let report = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(handler.applied(), vec!["e1", "e3"]);
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert!(!engine.dedup().contains("e2"), "failed events must stay eligible for retry");
}

#[tokio::test]
async fn follows_cursor_across_full_pages() {
    let b = bucket("20250307060000");
    let source = Arc::new(
        MockEventSource::new()
            .on_page(RUN, LOGGED, &b, None, page(vec![run_event("e1"), run_event("e2")], Some("c1")))
            .on_page(RUN, LOGGED, &b, Some("c1"), page(vec![run_event("e3")], Some("c2"))),
    );
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 2);

    engine.process_unit(&logged_key(), &b).await;

    assert_eq!(handler.applied(), vec!["e1", "e2", "e3"]);
    // The short second page ends the unit even though it carries a cursor.
    let cursors: Vec<Option<String>> = source.fetches().into_iter().map(|f| f.cursor).collect();
    assert_eq!(cursors, vec![None, Some("c1".to_string())]);
}

#[tokio::test]
async fn redelivered_page_is_skipped_by_dedup() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &b,
        None,
        page(vec![run_event("e1")], None),
    ));
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 500);

    let first = engine.process_unit(&logged_key(), &b).await;
    let second = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(first.processed, 1);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(handler.applied(), vec!["e1"]);
}

#[tokio::test]
async fn empty_unit_is_not_refetched_within_ttl() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let first = engine.process_unit(&logged_key(), &b).await;
    let second = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(first.outcome, UnitOutcome::Completed);
    assert_eq!(second.outcome, UnitOutcome::SkippedRecentlyEmpty);
    assert_eq!(source.fetches().len(), 1);
}

#[tokio::test]
async fn new_events_clear_the_empty_mark() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new());
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 500);

    engine.process_unit(&logged_key(), &b).await;
    assert!(engine.empty_buckets().is_recently_empty(&logged_key(), &b, Utc::now()));

    // Finalization bypasses the empty mark and finds the late event.
    source.put_page(RUN, LOGGED, &b, None, page(vec![run_event("late")], None));
    engine.poll_tick(b.start()).await;
    engine.poll_tick(b.next().start()).await;

    assert_eq!(handler.applied(), vec!["late"]);
    assert!(!engine.empty_buckets().is_recently_empty(&logged_key(), &b, Utc::now()));
}

#[tokio::test]
async fn unregistered_pair_is_skipped_without_fetching() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let report = engine
        .process_unit(&EventKey::new(RUN, "run.archived.0"), &b)
        .await;

    assert_eq!(report.outcome, UnitOutcome::Unregistered);
    assert!(source.fetches().is_empty());
}

// ---------------------------------------------------------------------------
// Fetch failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inapplicable_pair_is_treated_as_empty() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().fail(
        RUN,
        LOGGED,
        SourceError::from_status(403, "IAM validation failed"),
    ));
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let first = engine.process_unit(&logged_key(), &b).await;
    let second = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(
        first.outcome,
        UnitOutcome::Abandoned(ErrorClass::PermanentlyInapplicable)
    );
    assert_eq!(second.outcome, UnitOutcome::SkippedRecentlyEmpty);
    assert_eq!(source.fetches().len(), 1);
}

#[tokio::test]
async fn transient_failure_is_retried_next_time() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().fail(
        RUN,
        LOGGED,
        SourceError::from_status(503, "upstream unavailable"),
    ));
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 500);

    let first = engine.process_unit(&logged_key(), &b).await;
    assert_eq!(first.outcome, UnitOutcome::Abandoned(ErrorClass::Transient));

    source.set_failure(RUN, LOGGED, None);
    source.put_page(RUN, LOGGED, &b, None, page(vec![run_event("e1")], None));
    let second = engine.process_unit(&logged_key(), &b).await;

    assert_eq!(second.outcome, UnitOutcome::Completed);
    assert_eq!(handler.applied(), vec!["e1"]);
}

// ---------------------------------------------------------------------------
// Buckets and ticks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bucket_units_run_in_registry_order() {
    let b = bucket("20250307060000");
    let source = Arc::new(
        MockEventSource::new()
            .on_page(USER, USER_CREATED, &b, None, page(vec![raw_event("u1", USER, USER_CREATED, json!({}))], None))
            .on_page(RUN, LOGGED, &b, None, page(vec![run_event("r1")], None)),
    );
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = DispatchRegistry::new()
        .with(RUN, LOGGED, RecordingHandler::sharing(journal.clone()))
        .with(USER, USER_CREATED, RecordingHandler::sharing(journal.clone()));
    let mut engine = ProjectionEngine::new(source.clone(), Arc::new(registry), 500);

    let totals = engine.process_bucket(&b).await;

    assert_eq!(totals.processed, 2);
    assert_eq!(*journal.lock().unwrap(), vec!["r1", "u1"]);
}

#[tokio::test]
async fn rollover_finalizes_the_old_bucket_first() {
    let b1 = bucket("20250307060000");
    let b2 = bucket("20250307070000");
    let source = Arc::new(MockEventSource::new());
    let handler = RecordingHandler::new();
    let mut engine = engine_with(&source, handler.clone(), 500);

    let tick1 = engine.poll_tick(at(6, 59, 30)).await;
    assert_eq!(tick1.current, b1);
    assert!(tick1.finalized.is_none());

    // Lands in B1 just before the hour, visible only after it.
    source.put_page(RUN, LOGGED, &b1, None, page(vec![run_event("late")], None));
    source.clear_fetches();

    let tick2 = engine.poll_tick(at(7, 0, 10)).await;

    assert_eq!(tick2.current, b2);
    assert_eq!(tick2.finalized, Some(b1.clone()));
    let order: Vec<_> = source.fetches().into_iter().map(|f| f.bucket).collect();
    assert_eq!(order, vec![b1.clone(), b2]);
    assert_eq!(handler.applied(), vec!["late"]);
    assert_eq!(engine.last_current(), Some(&tick2.current));
}

#[tokio::test]
async fn quiet_tick_leaves_previous_bucket_alone() {
    let current = bucket("20250307060000");
    let previous = bucket("20250307050000");
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let tick = engine.poll_tick(at(6, 10, 0)).await;

    assert!(!tick.previous_checked);
    assert_eq!(source.fetches_for(&current), 1);
    assert_eq!(source.fetches_for(&previous), 0);

    // Same hour again: the current bucket is cached as empty.
    engine.poll_tick(at(6, 10, 30)).await;
    assert_eq!(source.fetches_for(&current), 1);
}

#[tokio::test]
async fn busy_tick_also_checks_previous_bucket() {
    let current = bucket("20250307060000");
    let previous = bucket("20250307050000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &current,
        None,
        page(vec![run_event("e1")], None),
    ));
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let tick = engine.poll_tick(at(6, 10, 0)).await;

    assert!(tick.previous_checked);
    assert_eq!(tick.totals.processed, 1);
    assert_eq!(source.fetches_for(&previous), 1);
}

#[tokio::test]
async fn previous_bucket_finalized_on_rollover_is_not_rechecked() {
    let b06 = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    engine.poll_tick(at(6, 59, 30)).await;
    source.clear_fetches();

    let tick = engine.poll_tick(at(7, 0, 10)).await;

    assert_eq!(tick.finalized, Some(b06.clone()));
    assert!(!tick.previous_checked);
    assert_eq!(source.fetches_for(&b06), 1);
}

#[tokio::test]
async fn empty_ttl_follows_the_tick_clock() {
    let current = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    engine.poll_tick(at(6, 10, 0)).await;
    engine.poll_tick(at(6, 14, 0)).await;
    assert_eq!(source.fetches_for(&current), 1);

    // Five minutes after the mark, by the tick's clock, it is fetched again.
    engine.poll_tick(at(6, 15, 0)).await;
    assert_eq!(source.fetches_for(&current), 2);
}

#[tokio::test]
async fn panicking_tick_still_finalizes_on_next_rollover() {
    let b06 = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &b06,
        None,
        page(vec![run_event("boom")], None),
    ));
    let handler = RecordingHandler::new().panicking_once_on("boom");
    let mut engine = engine_with(&source, handler.clone(), 500);

    engine.poll_tick(at(5, 50, 0)).await;

    let tick1 = AssertUnwindSafe(engine.poll_tick(at(6, 59, 30))).catch_unwind().await;
    assert!(tick1.is_err());
    assert_eq!(engine.last_current(), Some(&b06));

    // Lands in B06 just before the hour.
    source.put_page(RUN, LOGGED, &b06, None, page(vec![run_event("boom"), run_event("late")], None));

    let tick2 = engine.poll_tick(at(7, 0, 10)).await;

    assert_eq!(tick2.finalized, Some(b06));
    assert_eq!(handler.applied(), vec!["boom", "late"]);
}

// ---------------------------------------------------------------------------
// Backlog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backlog_replays_last_buckets_oldest_first() {
    let buckets: Vec<_> = ["20250307020000", "20250307030000", "20250307040000", "20250307050000", "20250307060000"]
        .iter()
        .map(|raw| bucket(raw))
        .collect();
    let source = Arc::new(MockEventSource::new().with_buckets(buckets.clone()));
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    let replayed = engine.catch_up_backlog(3).await.unwrap();

    assert_eq!(replayed, 3);
    let order: Vec<_> = source.fetches().into_iter().map(|f| f.bucket).collect();
    assert_eq!(order, buckets[2..].to_vec());
}

#[tokio::test]
async fn backlog_pages_through_the_bucket_listing() {
    let buckets: Vec<_> = (0..7)
        .map(|h| bucket(&format!("202503070{h}0000")))
        .collect();
    let source = Arc::new(MockEventSource::new().with_buckets(buckets.clone()));
    // Page size 2 caps every listing call at two buckets.
    let mut engine = engine_with(&source, RecordingHandler::new(), 2);

    let replayed = engine.catch_up_backlog(3).await.unwrap();

    assert_eq!(replayed, 3);
    let order: Vec<_> = source.fetches().into_iter().map(|f| f.bucket).collect();
    assert_eq!(order, buckets[4..].to_vec());
}

#[tokio::test]
async fn backlog_with_no_buckets_is_a_no_op() {
    let source = Arc::new(MockEventSource::new());
    let mut engine = engine_with(&source, RecordingHandler::new(), 500);

    assert_eq!(engine.catch_up_backlog(3).await.unwrap(), 0);
    assert!(source.fetches().is_empty());
}

#[tokio::test]
async fn count_unit_does_not_dispatch() {
    let b = bucket("20250307060000");
    let source = Arc::new(MockEventSource::new().on_page(
        RUN,
        LOGGED,
        &b,
        None,
        page(vec![run_event("e1"), run_event("e2")], None),
    ));
    let handler = RecordingHandler::new();
    let engine = engine_with(&source, handler.clone(), 500);

    assert_eq!(engine.count_unit(&logged_key(), &b).await.unwrap(), 2);
    assert!(handler.applied().is_empty());
}
