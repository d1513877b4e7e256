use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::routes::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Key from `Authorization: Bearer <key>`, else from `X-API-Key`.
fn provided_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    bearer.or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()))
}

/// Length-independent comparison of the whole key.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized", "message": message })),
    )
        .into_response()
}

/// Guards `/api/*`. With no key configured every request passes.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    match provided_key(request.headers()) {
        None => unauthorized(
            "API key required. Provide via Authorization: Bearer <key> or X-API-Key header",
        ),
        Some(key) if keys_match(key, expected) => next.run(request).await,
        Some(_) => unauthorized("Invalid API key"),
    }
}
