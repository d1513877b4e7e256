use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use calendrun_readmodel::UserRow;
use serde::Deserialize;

use super::{store, ApiError};
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersQuery {
    user_ids: Option<String>,
}

/// Split a comma-separated id list, dropping blanks.
fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// `?userIds=a,b,c` returns just those users; without it, every user.
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UsersQuery>,
) -> Result<Json<Vec<UserRow>>, ApiError> {
    let ids = match params.user_ids.as_deref() {
        Some(raw) => {
            let ids = split_ids(raw);
            // An explicit but blank list selects nobody.
            if ids.is_empty() {
                return Ok(Json(Vec::new()));
            }
            ids
        }
        None => Vec::new(),
    };

    let users = state
        .read_model
        .list_users(&ids)
        .await
        .map_err(store("Failed to fetch users"))?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserRow>, ApiError> {
    state
        .read_model
        .get_user(&id)
        .await
        .map_err(store("Failed to fetch user"))?
        .map(Json)
        .ok_or(ApiError::NotFound("User not found"))
}
