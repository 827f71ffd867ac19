use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use super::error_response;
use crate::schedule::JobEngine;
use crate::utils::http::ApiResponse;
use crate::web::Pagination;

pub fn admin_router(engine: Arc<JobEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/jobs", get(list_jobs))
        .with_state(engine)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

async fn stats(State(engine): State<Arc<JobEngine>>) -> Response {
    match engine.stats().await {
        Ok(stats) => Json(ApiResponse::success(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_jobs(
    State(engine): State<Arc<JobEngine>>,
    Query(pagination): Query<Pagination>,
) -> Response {
    match engine.list(&pagination).await {
        Ok(jobs) => Json(ApiResponse::success(jobs)).into_response(),
        Err(e) => error_response(e),
    }
}
