use std::collections::HashMap;

use calendrun_common::EventKey;
use chrono::{DateTime, Duration, Utc};
use flowcore_client::TimeBucket;

/// Default time a quiet unit is skipped for, in seconds.
pub const EMPTY_BUCKET_TTL_SECS: i64 = 5 * 60;

/// Remembers (flow, event type, bucket) units whose last fetch found nothing
/// new, so quiet units are not re-polled within the TTL.
#[derive(Debug)]
pub struct EmptyBucketCache {
    ttl: Duration,
    entries: HashMap<(EventKey, TimeBucket), DateTime<Utc>>,
}

impl Default for EmptyBucketCache {
    fn default() -> Self {
        Self::new(Duration::seconds(EMPTY_BUCKET_TTL_SECS))
    }
}

impl EmptyBucketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn is_recently_empty(&self, key: &EventKey, bucket: &TimeBucket, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&(key.clone(), bucket.clone()))
            .is_some_and(|marked| now - *marked < self.ttl)
    }

    pub fn mark_empty(&mut self, key: &EventKey, bucket: &TimeBucket, now: DateTime<Utc>) {
        self.entries.insert((key.clone(), bucket.clone()), now);
    }

    pub fn clear(&mut self, key: &EventKey, bucket: &TimeBucket) {
        self.entries.remove(&(key.clone(), bucket.clone()));
    }

    /// Drop every entry at or past the TTL. Returns how many were dropped.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, marked| now - *marked < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
