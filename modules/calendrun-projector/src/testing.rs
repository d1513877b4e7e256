// Test doubles for the projection engine.
//
// - MockEventSource (EventSource): pages keyed by (pair, bucket, cursor),
//   per-pair failures, and a log of every fetch
// - RecordingHandler (ProjectionHandler): remembers applied event ids and
//   fails on request
//
// Plus helpers for building raw events and pages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calendrun_common::EventKey;
use chrono::Utc;
use flowcore_client::{EventPage, RawEvent, TimeBucket};
use serde_json::Value;

use crate::contracts::ContractError;
use crate::handler::{HandlerError, ProjectionHandler};
use crate::source::{EventSource, SourceError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn raw_event(event_id: &str, flow_type: &str, event_type: &str, payload: Value) -> RawEvent {
    let now = Utc::now();
    RawEvent {
        event_id: event_id.to_string(),
        flow_type: flow_type.to_string(),
        event_type: event_type.to_string(),
        payload,
        time_bucket: TimeBucket::from_datetime(now),
        created_at: now,
    }
}

pub fn page(events: Vec<RawEvent>, next_cursor: Option<&str>) -> EventPage {
    EventPage {
        events,
        next_cursor: next_cursor.map(str::to_string),
    }
}

pub fn bucket(raw: &str) -> TimeBucket {
    TimeBucket::parse(raw).unwrap_or_else(|e| panic!("bad test bucket {raw:?}: {e}"))
}

// ---------------------------------------------------------------------------
// MockEventSource
// ---------------------------------------------------------------------------

type PageKey = (EventKey, TimeBucket, Option<String>);

/// A fetch the engine made, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub key: EventKey,
    pub bucket: TimeBucket,
    pub cursor: Option<String>,
}

/// In-memory event log. Unregistered (pair, bucket, cursor) combinations
/// return an empty page. Builder pattern: `.on_page()`, `.fail()`,
/// `.with_buckets()`; pages can also be swapped mid-test with `put_page`.
#[derive(Default)]
pub struct MockEventSource {
    pages: Mutex<HashMap<PageKey, EventPage>>,
    failures: Mutex<HashMap<EventKey, SourceError>>,
    buckets: Vec<TimeBucket>,
    fetches: Mutex<Vec<Fetch>>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(
        self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        page: EventPage,
    ) -> Self {
        self.put_page(flow_type, event_type, bucket, cursor, page);
        self
    }

    pub fn fail(self, flow_type: &str, event_type: &str, err: SourceError) -> Self {
        self.set_failure(flow_type, event_type, Some(err));
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<TimeBucket>) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn put_page(
        &self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        page: EventPage,
    ) {
        let key = (
            EventKey::new(flow_type, event_type),
            bucket.clone(),
            cursor.map(str::to_string),
        );
        self.pages.lock().unwrap().insert(key, page);
    }

    pub fn set_failure(&self, flow_type: &str, event_type: &str, err: Option<SourceError>) {
        let key = EventKey::new(flow_type, event_type);
        let mut failures = self.failures.lock().unwrap();
        match err {
            Some(err) => failures.insert(key, err),
            None => failures.remove(&key),
        };
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.fetches.lock().unwrap().clone()
    }

    /// Fetches made against `bucket`, any pair.
    pub fn fetches_for(&self, bucket: &TimeBucket) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|f| &f.bucket == bucket)
            .count()
    }

    pub fn clear_fetches(&self) {
        self.fetches.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn list_time_buckets(
        &self,
        _flow_type: &str,
        _event_type: &str,
        from: Option<&TimeBucket>,
        to: Option<&TimeBucket>,
        page_size: u32,
    ) -> Result<Vec<TimeBucket>, SourceError> {
        let mut listed: Vec<TimeBucket> = self
            .buckets
            .iter()
            .filter(|b| from.map_or(true, |f| *b >= f))
            .filter(|b| to.map_or(true, |t| *b <= t))
            .cloned()
            .collect();
        listed.sort();
        listed.truncate(page_size as usize);
        Ok(listed)
    }

    async fn fetch_page(
        &self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<EventPage, SourceError> {
        let key = EventKey::new(flow_type, event_type);
        self.fetches.lock().unwrap().push(Fetch {
            key: key.clone(),
            bucket: bucket.clone(),
            cursor: cursor.map(str::to_string),
        });

        if let Some(err) = self.failures.lock().unwrap().get(&key) {
            return Err(err.clone());
        }

        let page_key = (key, bucket.clone(), cursor.map(str::to_string));
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page_key)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RecordingHandler
// ---------------------------------------------------------------------------

/// Records the id of every event it applies. Clones share the same record,
/// so a test can keep one clone and register another.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    applied: Arc<Mutex<Vec<String>>>,
    fail_on: HashSet<String>,
    panic_once_on: Arc<Mutex<HashSet<String>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into an existing journal, to observe ordering across handlers.
    pub fn sharing(journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            applied: journal,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, event_id: &str) -> Self {
        self.fail_on.insert(event_id.to_string());
        self
    }

    /// Panic the first time `event_id` is applied; later deliveries succeed.
    pub fn panicking_once_on(self, event_id: &str) -> Self {
        self.panic_once_on.lock().unwrap().insert(event_id.to_string());
        self
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProjectionHandler for RecordingHandler {
    async fn apply(&self, _payload: &Value, event_id: &str) -> Result<(), HandlerError> {
        let panics = self.panic_once_on.lock().unwrap().remove(event_id);
        if panics {
            panic!("handler panicked on {event_id}");
        }
        if self.fail_on.contains(event_id) {
            return Err(ContractError::invalid("payload", format!("{event_id} rejected")).into());
        }
        self.applied.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}
