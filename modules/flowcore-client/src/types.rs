//! Normalized event-source types and the response-shape normalization that
//! produces them.
//!
//! The upstream API has shipped several response shapes over time. Rather
//! than probing optional fields at every call site, each response is run
//! through one normalizer with a fixed field-name precedence:
//!
//! | Value            | Precedence (first present wins)                     |
//! |------------------|-----------------------------------------------------|
//! | event list       | `events`, `data`                                    |
//! | event id         | `eventId`, `id`                                     |
//! | event payload    | `payload`, `data`, whole event object               |
//! | event created-at | `createdAt`, `validTime`, fetch time                |
//! | next cursor      | `nextCursor`, `cursor`                              |
//! | bucket list      | bare array, `timeBuckets`, `buckets`, `data`        |
//! | bucket entry     | string, `timeBucket`, `bucket`, `name`, `value`     |
//! | data core id     | `id`, `dataCoreId` (optionally under `data`)        |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::time_bucket::TimeBucket;

pub const EVENT_LIST_FIELDS: &[&str] = &["events", "data"];
pub const EVENT_ID_FIELDS: &[&str] = &["eventId", "id"];
pub const PAYLOAD_FIELDS: &[&str] = &["payload", "data"];
pub const CREATED_AT_FIELDS: &[&str] = &["createdAt", "validTime"];
pub const CURSOR_FIELDS: &[&str] = &["nextCursor", "cursor"];
pub const BUCKET_LIST_FIELDS: &[&str] = &["timeBuckets", "buckets", "data"];
pub const BUCKET_ENTRY_FIELDS: &[&str] = &["timeBucket", "bucket", "name", "value"];
pub const DATA_CORE_ID_FIELDS: &[&str] = &["id", "dataCoreId"];

/// An event as observed from the remote log. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub event_id: String,
    pub flow_type: String,
    pub event_type: String,
    pub payload: Value,
    pub time_bucket: TimeBucket,
    pub created_at: DateTime<Utc>,
}

/// One page of a bucket. `next_cursor == None` means the bucket is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<RawEvent>,
    pub next_cursor: Option<String>,
}

/// First field in `names` that is present and not null.
fn first_field<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn first_str<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| obj.get(*name).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Normalize a fetch-events response into an `EventPage`.
///
/// Events without an id cannot be deduplicated or guarded, so they are
/// dropped with a warning.
pub fn normalize_event_page(
    body: &Value,
    flow_type: &str,
    event_type: &str,
    bucket: &TimeBucket,
    fetched_at: DateTime<Utc>,
) -> EventPage {
    let raw_events = match body {
        Value::Array(items) => items.as_slice(),
        _ => first_field(body, EVENT_LIST_FIELDS)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    };

    let events = raw_events
        .iter()
        .filter_map(|event| normalize_event(event, flow_type, event_type, bucket, fetched_at))
        .collect();

    let next_cursor = match body {
        Value::Object(_) => first_str(body, CURSOR_FIELDS).map(str::to_string),
        _ => None,
    };

    EventPage {
        events,
        next_cursor,
    }
}

fn normalize_event(
    event: &Value,
    flow_type: &str,
    event_type: &str,
    bucket: &TimeBucket,
    fetched_at: DateTime<Utc>,
) -> Option<RawEvent> {
    let Some(event_id) = first_str(event, EVENT_ID_FIELDS) else {
        warn!(flow_type, event_type, bucket = %bucket, "Event missing id, skipping");
        return None;
    };

    let payload = first_field(event, PAYLOAD_FIELDS)
        .cloned()
        .unwrap_or_else(|| event.clone());

    let created_at = first_str(event, CREATED_AT_FIELDS)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fetched_at);

    Some(RawEvent {
        event_id: event_id.to_string(),
        flow_type: flow_type.to_string(),
        event_type: event_type.to_string(),
        payload,
        time_bucket: bucket.clone(),
        created_at,
    })
}

/// Normalize a time-bucket listing into ascending, de-duplicated buckets.
/// Entries that are not valid bucket keys are dropped with a warning.
pub fn normalize_time_buckets(body: &Value) -> Vec<TimeBucket> {
    let entries = match body {
        Value::Array(items) => items.as_slice(),
        _ => first_field(body, BUCKET_LIST_FIELDS)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    };

    let mut buckets: Vec<TimeBucket> = entries
        .iter()
        .filter_map(|entry| {
            let raw = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => first_str(entry, BUCKET_ENTRY_FIELDS),
                _ => None,
            }?;
            match TimeBucket::parse(raw) {
                Ok(bucket) => Some(bucket),
                Err(e) => {
                    warn!(error = %e, "Dropping unparseable time bucket");
                    None
                }
            }
        })
        .collect();

    if buckets.is_empty() && !entries.is_empty() {
        let preview: String = body.to_string().chars().take(200).collect();
        warn!(preview, "Could not extract time buckets from response");
    }

    buckets.sort();
    buckets.dedup();
    buckets
}

/// Pull the opaque data-core id out of a lookup response.
pub fn normalize_data_core_id(body: &Value) -> Option<String> {
    first_str(body, DATA_CORE_ID_FIELDS)
        .or_else(|| {
            body.get("data")
                .and_then(|data| first_str(data, DATA_CORE_ID_FIELDS))
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket() -> TimeBucket {
        TimeBucket::parse("20250307090000").unwrap()
    }

    fn fetched_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-07T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn prefers_primary_field_names() {
        let body = json!({
            "events": [{
                "eventId": "e1",
                "id": "ignored",
                "payload": {"distanceKm": 5},
                "data": {"distanceKm": 99},
                "createdAt": "2025-03-07T09:10:00Z",
                "validTime": "2025-03-07T09:20:00Z"
            }],
            "data": [],
            "nextCursor": "c2",
            "cursor": "ignored"
        });

        let page = normalize_event_page(&body, "run.0", "run.logged.0", &bucket(), fetched_at());
        assert_eq!(page.events.len(), 1);
        let event = &page.events[0];
        assert_eq!(event.event_id, "e1");
        assert_eq!(event.payload, json!({"distanceKm": 5}));
        assert_eq!(event.created_at.to_rfc3339(), "2025-03-07T09:10:00+00:00");
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn falls_back_to_alternate_field_names() {
        let body = json!({
            "data": [{
                "id": "e2",
                "data": {"name": "club"},
                "validTime": "2025-03-07T09:20:00Z"
            }],
            "cursor": "c9"
        });

        let page = normalize_event_page(&body, "club.0", "club.created.0", &bucket(), fetched_at());
        let event = &page.events[0];
        assert_eq!(event.event_id, "e2");
        assert_eq!(event.payload, json!({"name": "club"}));
        assert_eq!(event.created_at.to_rfc3339(), "2025-03-07T09:20:00+00:00");
        assert_eq!(page.next_cursor.as_deref(), Some("c9"));
    }

    #[test]
    fn whole_event_is_the_payload_when_no_payload_field() {
        let body = json!({"events": [{"id": "e3", "name": "Ada"}]});
        let page = normalize_event_page(&body, "user.0", "user.created.0", &bucket(), fetched_at());
        assert_eq!(page.events[0].payload, json!({"id": "e3", "name": "Ada"}));
        assert_eq!(page.events[0].created_at, fetched_at());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn events_without_id_are_dropped_but_order_is_kept() {
        let body = json!({"events": [
            {"eventId": "a", "payload": {}},
            {"payload": {}},
            {"eventId": "b", "payload": {}}
        ]});
        let page = normalize_event_page(&body, "run.0", "run.logged.0", &bucket(), fetched_at());
        let ids: Vec<&str> = page.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_event_list_is_an_empty_page() {
        let page = normalize_event_page(&json!({}), "run.0", "run.logged.0", &bucket(), fetched_at());
        assert_eq!(page, EventPage::default());
    }

    #[test]
    fn time_buckets_from_bare_array() {
        let body = json!(["20250307100000", "20250307090000", "garbage", "20250307090000"]);
        let keys: Vec<String> = normalize_time_buckets(&body)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, vec!["20250307090000", "20250307100000"]);
    }

    #[test]
    fn time_buckets_from_wrapped_objects() {
        let body = json!({"buckets": [
            {"timeBucket": "20250307090000"},
            {"name": "20250307080000"},
            {"value": "20250307070000"},
            {"unrelated": true}
        ]});
        let keys: Vec<String> = normalize_time_buckets(&body)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            keys,
            vec!["20250307070000", "20250307080000", "20250307090000"]
        );
    }

    #[test]
    fn data_core_id_may_be_nested() {
        assert_eq!(
            normalize_data_core_id(&json!({"id": "dc-1"})).as_deref(),
            Some("dc-1")
        );
        assert_eq!(
            normalize_data_core_id(&json!({"data": {"dataCoreId": "dc-2"}})).as_deref(),
            Some("dc-2")
        );
        assert!(normalize_data_core_id(&json!({"name": "calendrun"})).is_none());
    }
}
