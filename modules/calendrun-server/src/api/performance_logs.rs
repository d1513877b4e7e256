use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use calendrun_common::events::event_types;
use calendrun_readmodel::PerformanceLogFilter;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{limit, parse_instant, parse_uuid, store, ApiError};
use crate::routes::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

const RUN_EVENT_TYPES: &[&str] = &[
    event_types::RUN_LOGGED,
    event_types::RUN_UPDATED,
    event_types::RUN_DELETED,
];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    user_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    event_type: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("userId query parameter is required"))?;

    if let Some(event_type) = params.event_type.as_deref() {
        if !RUN_EVENT_TYPES.contains(&event_type) {
            return Err(ApiError::bad_request(format!(
                "eventType must be one of: {}",
                RUN_EVENT_TYPES.join(", ")
            )));
        }
    }

    let limit = limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT)?;
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::bad_request("offset must be >= 0"));
    }

    let filter = PerformanceLogFilter {
        user_id,
        start: params
            .start_date
            .as_deref()
            .map(|raw| parse_instant("startDate", raw, false))
            .transpose()?,
        end: params
            .end_date
            .as_deref()
            .map(|raw| parse_instant("endDate", raw, true))
            .transpose()?,
        event_type: params.event_type,
        limit,
        offset,
    };

    let logs = state
        .read_model
        .performance_logs(&filter)
        .await
        .map_err(store("Failed to fetch performance logs"))?;

    Ok(Json(json!({
        "count": logs.len(),
        "logs": logs,
        "limit": limit,
        "offset": offset,
    })))
}

pub async fn logs_for_run(
    State(state): State<AppState>,
    Path(performance_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let performance_id = parse_uuid("performanceId", &performance_id)?;
    let logs = state
        .read_model
        .performance_logs_for_run(performance_id)
        .await
        .map_err(store("Failed to fetch performance logs"))?;

    Ok(Json(json!({
        "count": logs.len(),
        "logs": logs,
    })))
}
