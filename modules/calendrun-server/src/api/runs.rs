use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use calendrun_readmodel::{RunFilter, RunRow};
use serde::Deserialize;

use super::{parse_date, parse_uuid, store, ApiError};
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsQuery {
    instance_id: Option<String>,
    user_id: Option<String>,
    run_date: Option<String>,
    status: Option<String>,
}

/// Latest row per user and run date, narrowed by the optional filters.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Vec<RunRow>>, ApiError> {
    let filter = RunFilter {
        instance_id: params
            .instance_id
            .as_deref()
            .map(|id| parse_uuid("instanceId", id))
            .transpose()?,
        user_id: params.user_id,
        run_date: params
            .run_date
            .as_deref()
            .map(|d| parse_date("runDate", d))
            .transpose()?,
        status: params.status,
    };

    let runs = state
        .read_model
        .list_runs(&filter)
        .await
        .map_err(store("Failed to fetch runs"))?;
    Ok(Json(runs))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunRow>, ApiError> {
    let id = parse_uuid("id", &id)?;
    state
        .read_model
        .get_run(id)
        .await
        .map_err(store("Failed to fetch run"))?
        .map(Json)
        .ok_or(ApiError::NotFound("Run not found"))
}
