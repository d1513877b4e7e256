//! Projection engine: pulls pages from the event source and feeds them to
//! the registered handlers, one (flow, event type, bucket) unit at a time.
//!
//! Everything runs sequentially on one task. The dedup and empty-bucket
//! caches are owned by the engine, so a fresh engine starts cold.

use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use calendrun_common::EventKey;
use flowcore_client::{RawEvent, TimeBucket};
use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, ErrorClass};
use crate::dedup::DedupCache;
use crate::empty_buckets::EmptyBucketCache;
use crate::registry::DispatchRegistry;
use crate::source::{EventSource, SourceError};

/// Max payload characters included in a handler failure log line.
const PAYLOAD_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Paged to the end of the bucket.
    Completed,
    /// Seen empty within the TTL; nothing fetched.
    SkippedRecentlyEmpty,
    /// No handler for this pair.
    Unregistered,
    /// A fetch failed; the unit stopped early.
    Abandoned(ErrorClass),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    fn new(outcome: UnitOutcome) -> Self {
        Self {
            processed: 0,
            skipped: 0,
            failed: 0,
            outcome,
        }
    }
}

/// Totals for one bucket across every registered pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BucketReport {
    fn add(&mut self, unit: &UnitReport) {
        self.processed += unit.processed;
        self.skipped += unit.skipped;
        self.failed += unit.failed;
    }

    fn merge(&mut self, other: &BucketReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for BucketReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} failed={}",
            self.processed, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub current: TimeBucket,
    /// The bucket finalized because the hour rolled over since the last tick.
    pub finalized: Option<TimeBucket>,
    /// Whether the previous hour was fetched on this tick.
    pub previous_checked: bool,
    pub totals: BucketReport,
}

pub struct ProjectionEngine {
    source: Arc<dyn EventSource>,
    registry: Arc<DispatchRegistry>,
    page_size: u32,
    dedup: DedupCache,
    empty: EmptyBucketCache,
    last_current: Option<TimeBucket>,
    reported_inapplicable: HashSet<EventKey>,
}

impl ProjectionEngine {
    pub fn new(source: Arc<dyn EventSource>, registry: Arc<DispatchRegistry>, page_size: u32) -> Self {
        Self {
            source,
            registry,
            page_size: page_size.max(1),
            dedup: DedupCache::default(),
            empty: EmptyBucketCache::default(),
            last_current: None,
            reported_inapplicable: HashSet::new(),
        }
    }

    pub fn with_dedup(mut self, dedup: DedupCache) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_empty_buckets(mut self, empty: EmptyBucketCache) -> Self {
        self.empty = empty;
        self
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn empty_buckets(&self) -> &EmptyBucketCache {
        &self.empty
    }

    pub fn last_current(&self) -> Option<&TimeBucket> {
        self.last_current.as_ref()
    }

    // -----------------------------------------------------------------------
    // Unit
    // -----------------------------------------------------------------------

    /// Run every page of one (flow, event type, bucket) unit through its
    /// handler. Never fails: fetch errors end the unit and are reported in
    /// the outcome, handler errors skip the single event.
    pub async fn process_unit(&mut self, key: &EventKey, bucket: &TimeBucket) -> UnitReport {
        self.run_unit(key, bucket, Utc::now(), false).await
    }

    /// `now` drives the empty-bucket TTL for the whole unit.
    async fn run_unit(
        &mut self,
        key: &EventKey,
        bucket: &TimeBucket,
        now: DateTime<Utc>,
        bypass_empty: bool,
    ) -> UnitReport {
        if !bypass_empty && self.empty.is_recently_empty(key, bucket, now) {
            debug!(flow = %key.flow_type, event_type = %key.event_type, bucket = %bucket, "Bucket recently empty, skipping");
            return UnitReport::new(UnitOutcome::SkippedRecentlyEmpty);
        }

        let Some(handler) = self.registry.get(key) else {
            warn!(flow = %key.flow_type, event_type = %key.event_type, "No handler registered, skipping");
            return UnitReport::new(UnitOutcome::Unregistered);
        };

        let mut report = UnitReport::new(UnitOutcome::Completed);
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .source
                .fetch_page(
                    &key.flow_type,
                    &key.event_type,
                    bucket,
                    cursor.as_deref(),
                    self.page_size,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let class = classify(&e);
                    self.log_fetch_failure(key, bucket, &e, class);
                    report.outcome = UnitOutcome::Abandoned(class);
                    break;
                }
            };

            if page.events.is_empty() {
                break;
            }
            let short_page = page.events.len() < self.page_size as usize;

            for event in &page.events {
                if self.dedup.contains(&event.event_id) {
                    report.skipped += 1;
                    continue;
                }

                match handler.apply(&event.payload, &event.event_id).await {
                    Ok(()) => {
                        self.dedup.add(&event.event_id);
                        report.processed += 1;
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(
                            event_id = %event.event_id,
                            flow = %key.flow_type,
                            event_type = %key.event_type,
                            bucket = %bucket,
                            payload = %payload_preview(event),
                            error = %e,
                            "Handler failed, event skipped"
                        );
                    }
                }
            }

            match page.next_cursor {
                Some(next) if !short_page && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        if report.processed > 0 {
            self.empty.clear(key, bucket);
            info!(
                flow = %key.flow_type,
                event_type = %key.event_type,
                bucket = %bucket,
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                "Processed events"
            );
        } else if report.outcome != UnitOutcome::Abandoned(ErrorClass::Transient) {
            self.empty.mark_empty(key, bucket, now);
            debug!(
                flow = %key.flow_type,
                event_type = %key.event_type,
                bucket = %bucket,
                skipped = report.skipped,
                failed = report.failed,
                "No new events"
            );
        }

        let swept = self.empty.sweep(now);
        if swept > 0 {
            debug!(swept, "Swept expired empty-bucket entries");
        }

        report
    }

    fn log_fetch_failure(&mut self, key: &EventKey, bucket: &TimeBucket, err: &SourceError, class: ErrorClass) {
        match class {
            ErrorClass::PermanentlyInapplicable => {
                if self.reported_inapplicable.insert(key.clone()) {
                    info!(
                        flow = %key.flow_type,
                        event_type = %key.event_type,
                        bucket = %bucket,
                        error = %err,
                        "Event type not readable, treating as empty"
                    );
                } else {
                    debug!(
                        flow = %key.flow_type,
                        event_type = %key.event_type,
                        bucket = %bucket,
                        error = %err,
                        "Event type not readable"
                    );
                }
            }
            ErrorClass::Transient => {
                warn!(
                    flow = %key.flow_type,
                    event_type = %key.event_type,
                    bucket = %bucket,
                    page_size = self.page_size,
                    error = %err,
                    "Fetch failed, will retry next tick"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bucket / backlog / tick
    // -----------------------------------------------------------------------

    /// Every registered pair against one bucket, in registry order.
    pub async fn process_bucket(&mut self, bucket: &TimeBucket) -> BucketReport {
        self.run_bucket(bucket, Utc::now(), false).await
    }

    async fn run_bucket(&mut self, bucket: &TimeBucket, now: DateTime<Utc>, bypass_empty: bool) -> BucketReport {
        let keys: Vec<EventKey> = self.registry.keys().cloned().collect();
        let mut totals = BucketReport::default();
        for key in &keys {
            let unit = self.run_unit(key, bucket, now, bypass_empty).await;
            totals.add(&unit);
        }
        totals
    }

    /// Replay the last `count` buckets of the representative pair for every
    /// registered pair, oldest first. Returns how many buckets were replayed.
    pub async fn catch_up_backlog(&mut self, count: usize) -> Result<usize, SourceError> {
        let Some(representative) = self.registry.representative().cloned() else {
            return Ok(0);
        };
        if count == 0 {
            return Ok(0);
        }

        let mut buckets = self.list_all_buckets(&representative).await?;
        buckets.sort();
        buckets.dedup();

        let recent = &buckets[buckets.len().saturating_sub(count)..];
        if recent.is_empty() {
            info!("No time buckets found for backlog");
            return Ok(0);
        }

        info!(buckets = recent.len(), "Processing backlog");
        for bucket in recent {
            let totals = self.process_bucket(bucket).await;
            info!(bucket = %bucket, %totals, "Backlog bucket done");
        }
        Ok(recent.len())
    }

    /// The listing is ascending and capped at one page, so keep asking from
    /// just past the last bucket seen until a short page comes back.
    async fn list_all_buckets(&self, key: &EventKey) -> Result<Vec<TimeBucket>, SourceError> {
        let mut buckets = Vec::new();
        let mut from: Option<TimeBucket> = None;
        loop {
            let listed = self
                .source
                .list_time_buckets(&key.flow_type, &key.event_type, from.as_ref(), None, self.page_size)
                .await?;
            let full_page = listed.len() >= self.page_size as usize;
            let next = listed.iter().max().map(TimeBucket::next);
            buckets.extend(listed);

            match next {
                // A source that ignores `from` would repeat the same page.
                Some(next) if full_page && from.as_ref() != Some(&next) => from = Some(next),
                _ => break,
            }
        }
        Ok(buckets)
    }

    /// One poll tick at `now`. A bucket being finalized after a rollover is
    /// always fetched, even if it was recently seen empty.
    ///
    /// The remembered bucket only advances once finalization is done, so a
    /// tick that panics mid-finalize retries it on the next tick.
    pub async fn poll_tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let current = TimeBucket::current(now);
        let mut totals = BucketReport::default();

        let finalized = match self.last_current.clone() {
            Some(last) if last != current => {
                info!(from = %last, to = %current, "Time bucket rolled over, finalizing");
                totals = self.run_bucket(&last, now, true).await;
                Some(last)
            }
            _ => None,
        };
        self.last_current = Some(current.clone());

        let current_totals = self.run_bucket(&current, now, false).await;
        totals.merge(&current_totals);

        let mut previous_checked = false;
        if current_totals.processed > 0 || finalized.is_some() {
            let previous = TimeBucket::previous(now);
            // The finalize pass already covered it.
            if finalized.as_ref() != Some(&previous) {
                let prev_totals = self.run_bucket(&previous, now, false).await;
                totals.merge(&prev_totals);
                previous_checked = true;
            }
        }

        TickReport {
            current,
            finalized,
            previous_checked,
            totals,
        }
    }

    /// Poll forever. The first tick fires immediately; a panic inside a tick
    /// is logged and the loop carries on.
    pub async fn run(mut self, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "Starting poll loop");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match AssertUnwindSafe(self.poll_tick(Utc::now())).catch_unwind().await {
                Ok(report) if report.totals.processed > 0 => {
                    info!(bucket = %report.current, totals = %report.totals, "Poll tick complete");
                }
                Ok(report) => {
                    debug!(bucket = %report.current, totals = %report.totals, "Poll tick complete");
                }
                Err(_) => error!("Poll tick panicked, continuing with next tick"),
            }
        }
    }

    /// Count the events in one unit without dispatching them.
    pub async fn count_unit(&self, key: &EventKey, bucket: &TimeBucket) -> Result<usize, SourceError> {
        let mut total = 0;
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .source
                .fetch_page(
                    &key.flow_type,
                    &key.event_type,
                    bucket,
                    cursor.as_deref(),
                    self.page_size,
                )
                .await?;
            if page.events.is_empty() {
                break;
            }
            total += page.events.len();
            let short_page = page.events.len() < self.page_size as usize;
            match page.next_cursor {
                Some(next) if !short_page && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }
        Ok(total)
    }
}

fn payload_preview(event: &RawEvent) -> String {
    let raw = event.payload.to_string();
    match raw.char_indices().nth(PAYLOAD_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw,
    }
}
