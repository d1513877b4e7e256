use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use calendrun_readmodel::{ClubRow, MembershipRow};
use serde::Deserialize;
use serde_json::json;

use super::{limit, parse_uuid, store, ApiError};
use crate::routes::AppState;

const DEFAULT_RUNS_LIMIT: i64 = 50;
const MAX_RUNS_LIMIT: i64 = 500;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubsQuery {
    user_id: Option<String>,
    invite_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ClubRunsQuery {
    status: Option<String>,
    limit: Option<i64>,
}

/// `?inviteToken=` resolves a single club; `?userId=` lists the user's clubs.
pub async fn list_clubs(
    State(state): State<AppState>,
    Query(params): Query<ClubsQuery>,
) -> Result<Response, ApiError> {
    if let Some(token) = params.invite_token.as_deref() {
        let club = state
            .read_model
            .club_by_invite_token(token)
            .await
            .map_err(store("Failed to fetch clubs"))?
            .ok_or(ApiError::NotFound("Club not found"))?;
        return Ok(Json(club).into_response());
    }

    let user_id = params
        .user_id
        .ok_or_else(|| ApiError::bad_request("userId or inviteToken query parameter is required"))?;
    let clubs = state
        .read_model
        .clubs_for_user(&user_id)
        .await
        .map_err(store("Failed to fetch clubs"))?;
    Ok(Json(clubs).into_response())
}

pub async fn get_club(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClubRow>, ApiError> {
    let id = parse_uuid("id", &id)?;
    state
        .read_model
        .get_club(id)
        .await
        .map_err(store("Failed to fetch club"))?
        .map(Json)
        .ok_or(ApiError::NotFound("Club not found"))
}

pub async fn club_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MembershipRow>>, ApiError> {
    let id = parse_uuid("id", &id)?;
    let members = state
        .read_model
        .club_members(id)
        .await
        .map_err(store("Failed to fetch club members"))?;
    Ok(Json(members))
}

pub async fn club_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ClubRunsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_uuid("id", &id)?;
    let limit = limit(params.limit, DEFAULT_RUNS_LIMIT, MAX_RUNS_LIMIT)?;

    state
        .read_model
        .get_club(id)
        .await
        .map_err(store("Failed to fetch club runs"))?
        .ok_or(ApiError::NotFound("Club not found"))?;

    let runs = state
        .read_model
        .club_runs(id, params.status.as_deref(), limit)
        .await
        .map_err(store("Failed to fetch club runs"))?;

    Ok(Json(json!({
        "count": runs.len(),
        "runs": runs,
        "limit": limit,
    })))
}
