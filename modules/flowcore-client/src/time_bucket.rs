//! Hour-granular partition keys in canonical `YYYYMMDDHH0000` form (UTC).
//!
//! The fixed-width, zero-padded layout makes lexicographic order equal to
//! chronological order, so `Ord` on the key string is the bucket order.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KEY_LEN: usize = 14;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid time bucket {0:?}: expected YYYYMMDDHH0000")]
pub struct TimeBucketError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeBucket {
    key: String,
    start: DateTime<Utc>,
}

impl TimeBucket {
    /// The bucket containing `at`.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let start = floor_to_hour(at);
        Self {
            key: start.format("%Y%m%d%H0000").to_string(),
            start,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TimeBucketError> {
        let invalid = || TimeBucketError(raw.to_string());

        if raw.len() != KEY_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if &raw[10..] != "0000" {
            return Err(invalid());
        }

        let year: i32 = raw[0..4].parse().map_err(|_| invalid())?;
        let month: u32 = raw[4..6].parse().map_err(|_| invalid())?;
        let day: u32 = raw[6..8].parse().map_err(|_| invalid())?;
        let hour: u32 = raw[8..10].parse().map_err(|_| invalid())?;

        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .ok_or_else(invalid)?;

        Ok(Self {
            key: raw.to_string(),
            start: Utc.from_utc_datetime(&naive),
        })
    }

    /// Bucket for the wall-clock instant `now`.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self::from_datetime(now)
    }

    /// The bucket one hour before the one containing `now`.
    pub fn previous(now: DateTime<Utc>) -> Self {
        Self::current(now).prev()
    }

    pub fn next(&self) -> Self {
        Self::from_datetime(self.start + Duration::hours(1))
    }

    pub fn prev(&self) -> Self {
        Self::from_datetime(self.start - Duration::hours(1))
    }

    /// Every bucket from `from` through `to`, inclusive, oldest first.
    /// Empty when `from > to`.
    pub fn range(from: &TimeBucket, to: &TimeBucket) -> Vec<TimeBucket> {
        let mut buckets = Vec::new();
        let mut cursor = from.clone();
        while cursor <= *to {
            let next = cursor.next();
            buckets.push(cursor);
            cursor = next;
        }
        buckets
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// First instant covered by this bucket.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }
}

fn floor_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl std::str::FromStr for TimeBucket {
    type Err = TimeBucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeBucket {
    type Error = TimeBucketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeBucket> for String {
    fn from(bucket: TimeBucket) -> Self {
        bucket.key
    }
}
