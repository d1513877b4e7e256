//! Read-only JSON endpoints over the projection tables.

pub mod challenges;
pub mod clubs;
pub mod performance_logs;
pub mod runs;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use calendrun_readmodel::ReadModelError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: ReadModelError,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Store { context, source } => {
                error!(error = %source, "{context}");
                (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// `map_err` adapter that tags a store failure with what was being fetched.
pub fn store(context: &'static str) -> impl FnOnce(ReadModelError) -> ApiError {
    move |source| ApiError::Store { context, source }
}

pub fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("{field} must be a UUID")))
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("{field} must be a YYYY-MM-DD date")))
}

/// An RFC 3339 instant, or a bare date taken as the start (or end) of that
/// UTC day.
pub fn parse_instant(field: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::bad_request(format!("{field} must be an RFC 3339 timestamp or YYYY-MM-DD date"))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };
    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is out of range")))
}

/// Validate an optional `limit` against `1..=max`.
pub fn limit(raw: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    let limit = raw.unwrap_or(default);
    if (1..=max).contains(&limit) {
        Ok(limit)
    } else {
        Err(ApiError::bad_request(format!("limit must be between 1 and {max}")))
    }
}
