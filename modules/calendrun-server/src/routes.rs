use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use calendrun_readmodel::ReadModel;
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api;
use crate::auth::{require_api_key, API_KEY_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub read_model: ReadModel,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(read_model: ReadModel, api_key: Option<&str>) -> Self {
        Self {
            read_model,
            api_key: api_key.map(Arc::from),
        }
    }
}

fn cors(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers([
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(API_KEY_HEADER),
    ]);

    match origin.map(|o| (o, o.parse::<HeaderValue>())) {
        Some((_, Ok(value))) => layer.allow_origin(value),
        Some((raw, Err(_))) => {
            warn!(origin = raw, "Invalid CORS_ORIGIN, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let api = Router::new()
        .route("/runs", get(api::runs::list_runs))
        .route("/runs/{id}", get(api::runs::get_run))
        .route("/performance-logs", get(api::performance_logs::list_logs))
        .route(
            "/performance-logs/{performance_id}",
            get(api::performance_logs::logs_for_run),
        )
        .route("/challenges/templates", get(api::challenges::list_templates))
        .route("/challenges/templates/{id}", get(api::challenges::get_template))
        .route("/challenges/instances", get(api::challenges::list_instances))
        .route("/challenges/instances/{id}", get(api::challenges::get_instance))
        .route("/challenges/{instance_id}/runs", get(api::challenges::instance_runs))
        .route("/clubs", get(api::clubs::list_clubs))
        .route("/clubs/{id}", get(api::clubs::get_club))
        .route("/clubs/{id}/members", get(api::clubs::club_members))
        .route("/clubs/{id}/runs", get(api::clubs::club_runs))
        .route("/users", get(api::users::list_users))
        .route("/users/{id}", get(api::users::get_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(cors(cors_origin))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
