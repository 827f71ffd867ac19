use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use tracing::{error, warn};

use crate::schedule::JobError;
use crate::utils::http::ApiResponse;
use crate::AppContext;

pub mod admin;
pub mod jobs;
pub mod worker;

pub fn router(ctx: Arc<AppContext>, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(jobs::jobs_router(ctx.engine.clone()))
        .merge(worker::worker_router(ctx.engine.clone()))
        .merge(admin::admin_router(ctx.engine.clone()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

pub(crate) fn error_status(err: &JobError) -> StatusCode {
    match err {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidTransition { .. }
        | JobError::NotReady { .. }
        | JobError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        JobError::DuplicateUlid(_) => StatusCode::CONFLICT,
        JobError::Storage { .. }
        | JobError::MissingArtifact { .. }
        | JobError::CorruptRow(_)
        | JobError::Database(_)
        | JobError::Orm(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: JobError) -> Response {
    let status = error_status(&err);
    if err.is_internal() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    (status, Json(ApiResponse::<()>::error(err.to_string()))).into_response()
}

pub(crate) fn bad_request(message: String) -> Response {
    warn!("Request rejected: {}", message);
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(message)),
    )
        .into_response()
}
