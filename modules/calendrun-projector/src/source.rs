// Event source boundary.
//
// The engine only ever talks to the remote log through `EventSource`, so it
// can be driven by `MockEventSource` in tests: no network, no credentials.

use async_trait::async_trait;
use flowcore_client::{EventPage, FlowcoreClient, FlowcoreError, TimeBucket};
use thiserror::Error;

/// Failure classes surfaced by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unprocessable request: {0}")]
    UnprocessableRequest(String),

    #[error("transient: {0}")]
    Transient(String),
}

impl SourceError {
    /// Map an HTTP-like status and response body onto a failure class.
    pub fn from_status(status: u16, message: &str) -> Self {
        let detail = format!("status {status}: {message}");
        let upper = message.to_ascii_uppercase();

        if status == 401 {
            SourceError::Unauthenticated(detail)
        } else if status == 403
            || upper.contains("IAM VALIDATION FAILED")
            || upper.contains("FORBIDDEN")
        {
            SourceError::Unauthorized(detail)
        } else if status == 422 || upper.contains("UNPROCESSABLE") {
            SourceError::UnprocessableRequest(detail)
        } else {
            SourceError::Transient(detail)
        }
    }
}

impl From<FlowcoreError> for SourceError {
    fn from(err: FlowcoreError) -> Self {
        match err {
            FlowcoreError::Api { status, message } => SourceError::from_status(status, &message),
            other => SourceError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Buckets holding at least one event of the given type, ascending.
    async fn list_time_buckets(
        &self,
        flow_type: &str,
        event_type: &str,
        from: Option<&TimeBucket>,
        to: Option<&TimeBucket>,
        page_size: u32,
    ) -> Result<Vec<TimeBucket>, SourceError>;

    /// One page of a bucket, continuing from `cursor` when given.
    async fn fetch_page(
        &self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<EventPage, SourceError>;
}

#[async_trait]
impl EventSource for FlowcoreClient {
    async fn list_time_buckets(
        &self,
        flow_type: &str,
        event_type: &str,
        from: Option<&TimeBucket>,
        to: Option<&TimeBucket>,
        page_size: u32,
    ) -> Result<Vec<TimeBucket>, SourceError> {
        Ok(FlowcoreClient::list_time_buckets(self, flow_type, event_type, from, to, page_size).await?)
    }

    async fn fetch_page(
        &self,
        flow_type: &str,
        event_type: &str,
        bucket: &TimeBucket,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<EventPage, SourceError> {
        Ok(self
            .fetch_events(flow_type, event_type, bucket, cursor, page_size)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_classes() {
        assert!(matches!(
            SourceError::from_status(401, ""),
            SourceError::Unauthenticated(_)
        ));
        assert!(matches!(
            SourceError::from_status(403, ""),
            SourceError::Unauthorized(_)
        ));
        assert!(matches!(
            SourceError::from_status(422, ""),
            SourceError::UnprocessableRequest(_)
        ));
        assert!(matches!(
            SourceError::from_status(503, "upstream down"),
            SourceError::Transient(_)
        ));
    }

    #[test]
    fn body_markers_override_generic_status() {
        assert!(matches!(
            SourceError::from_status(400, "IAM validation failed for event type"),
            SourceError::Unauthorized(_)
        ));
        assert!(matches!(
            SourceError::from_status(400, "{\"code\":\"UNPROCESSABLE_CONTENT\"}"),
            SourceError::UnprocessableRequest(_)
        ));
    }

    #[test]
    fn client_failures_without_status_are_transient() {
        let err: SourceError = FlowcoreError::Network("connection reset".into()).into();
        assert!(matches!(err, SourceError::Transient(_)));
        let err: SourceError = FlowcoreError::Parse("expected value".into()).into();
        assert!(matches!(err, SourceError::Transient(_)));
    }
}
