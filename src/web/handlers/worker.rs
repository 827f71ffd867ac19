use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::schedule::{ClaimedJob, JobEngine, JobStatus, PingOutcome, WorkerCapabilities};
use crate::utils::http::ApiResponse;

pub fn worker_router(engine: Arc<JobEngine>) -> Router {
    Router::new()
        .route("/request-new-job", get(request_new_job))
        .route("/request-audio/:ulid", get(request_audio))
        .route("/heartbeat/:ulid", get(heartbeat))
        .route("/return-job", post(return_job))
        .route("/report-failure/:ulid", post(report_failure))
        .with_state(engine)
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimQuery {
    pub worker_id: Option<String>,
    /// Comma separated model selectors the worker can run.
    pub models: Option<String>,
}

impl From<ClaimQuery> for WorkerCapabilities {
    fn from(query: ClaimQuery) -> Self {
        let models = query
            .models
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        WorkerCapabilities {
            worker_id: query.worker_id,
            models,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub job_available: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub job: Option<ClaimedJob>,
}

async fn request_new_job(
    State(engine): State<Arc<JobEngine>>,
    Query(query): Query<ClaimQuery>,
) -> Response {
    let worker = WorkerCapabilities::from(query);
    match engine.claim(&worker).await {
        Ok(job) => Json(ClaimResponse {
            job_available: job.is_some(),
            job,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn request_audio(State(engine): State<Arc<JobEngine>>, Path(ulid): Path<String>) -> Response {
    match engine.audio(&ulid).await {
        Ok((file_name, bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

async fn heartbeat(State(engine): State<Arc<JobEngine>>, Path(ulid): Path<String>) -> Response {
    let (code, message, status) = match engine.ping(&ulid).await {
        Ok(PingOutcome::Acknowledged) => (StatusCode::OK, "acknowledged", None),
        Ok(PingOutcome::NotFound) => (StatusCode::NOT_FOUND, "job not found", None),
        Ok(PingOutcome::NotTranscribing(status)) => {
            (StatusCode::CONFLICT, "possible error. Please inspect", Some(status))
        }
        Err(e) => return error_response(e),
    };

    (
        code,
        Json(HeartbeatResponse {
            message: message.to_string(),
            status,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReturnJobForm {
    pub ulid: String,
    pub transcript: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReturnJobResponse {
    pub status: String,
    pub ulid: String,
    pub message: String,
}

async fn return_job(State(engine): State<Arc<JobEngine>>, Form(form): Form<ReturnJobForm>) -> Response {
    match engine.complete(&form.ulid, &form.transcript).await {
        Ok(done) => Json(ReturnJobResponse {
            status: "success".to_string(),
            ulid: done.ulid,
            message: "Transcription received and saved.".to_string(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn report_failure(State(engine): State<Arc<JobEngine>>, Path(ulid): Path<String>) -> Response {
    match engine.report_failure(&ulid).await {
        Ok(()) => Json(ApiResponse::success(ulid)).into_response(),
        Err(e) => error_response(e),
    }
}
