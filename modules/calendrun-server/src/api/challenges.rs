use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use calendrun_readmodel::{ChallengeInstanceRow, RunRow, TemplateRow};
use serde::Deserialize;

use super::{parse_uuid, store, ApiError};
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancesQuery {
    user_id: Option<String>,
    template_id: Option<String>,
}

pub async fn list_templates(State(state): State<AppState>) -> Result<Json<Vec<TemplateRow>>, ApiError> {
    let templates = state
        .read_model
        .list_templates()
        .await
        .map_err(store("Failed to fetch challenge templates"))?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TemplateRow>, ApiError> {
    let id = parse_uuid("id", &id)?;
    state
        .read_model
        .get_template(id)
        .await
        .map_err(store("Failed to fetch challenge template"))?
        .map(Json)
        .ok_or(ApiError::NotFound("Challenge template not found"))
}

/// Instances of one template, or of one user. `templateId` wins when both
/// are given.
pub async fn list_instances(
    State(state): State<AppState>,
    Query(params): Query<InstancesQuery>,
) -> Result<Json<Vec<ChallengeInstanceRow>>, ApiError> {
    let (user_id, template_id) = match (params.template_id.as_deref(), params.user_id.as_deref()) {
        (Some(template_id), _) => (None, Some(parse_uuid("templateId", template_id)?)),
        (None, Some(user_id)) => (Some(user_id), None),
        (None, None) => {
            return Err(ApiError::bad_request(
                "userId or templateId query parameter is required",
            ))
        }
    };

    let instances = state
        .read_model
        .list_challenges(user_id, template_id)
        .await
        .map_err(store("Failed to fetch challenge instances"))?;
    Ok(Json(instances))
}

pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChallengeInstanceRow>, ApiError> {
    let id = parse_uuid("id", &id)?;
    state
        .read_model
        .get_challenge(id)
        .await
        .map_err(store("Failed to fetch challenge instance"))?
        .map(Json)
        .ok_or(ApiError::NotFound("Challenge instance not found"))
}

pub async fn instance_runs(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<Json<Vec<RunRow>>, ApiError> {
    let instance_id = parse_uuid("instanceId", &instance_id)?;
    let runs = state
        .read_model
        .runs_for_instance(instance_id)
        .await
        .map_err(store("Failed to fetch runs"))?;
    Ok(Json(runs))
}
