use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::{bad_request, error_response};
use crate::schedule::{JobEngine, JobPriority, SubmitRequest};
use crate::utils::http::ApiResponse;

pub fn jobs_router(engine: Arc<JobEngine>) -> Router {
    Router::new()
        .route("/new-job", post(new_job))
        .route("/transcript/:ulid", get(get_transcript))
        .route("/check-transcript-status/:ulid", get(check_transcript_status))
        .route("/jobs/:ulid", get(get_job))
        .with_state(engine)
}

/// Parses the multipart submission form:
/// `priority_level` (optional, default low), `whisper_model` (optional),
/// `ulid` (optional) and `file`.
async fn read_submission(mut multipart: Multipart) -> Result<SubmitRequest, String> {
    let mut priority = JobPriority::default();
    let mut model_selector = None;
    let mut ulid = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "priority_level" => {
                priority = field.text().await.map_err(|e| e.to_string())?.parse()?;
            }
            "whisper_model" | "model" => {
                model_selector = Some(field.text().await.map_err(|e| e.to_string())?);
            }
            "ulid" => {
                let value = field.text().await.map_err(|e| e.to_string())?;
                if !value.trim().is_empty() {
                    ulid = Some(value);
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, audio) = file.ok_or_else(|| "missing file field".to_string())?;
    Ok(SubmitRequest {
        priority,
        model_selector,
        ulid,
        file_name,
        audio,
    })
}

async fn new_job(State(engine): State<Arc<JobEngine>>, multipart: Multipart) -> Response {
    let request = match read_submission(multipart).await {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };

    match engine.submit(request).await {
        Ok(submitted) => (StatusCode::CREATED, Json(submitted)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_transcript(State(engine): State<Arc<JobEngine>>, Path(ulid): Path<String>) -> Response {
    let retrieved = match engine.fetch(&ulid).await {
        Ok(retrieved) => retrieved,
        Err(e) => return error_response(e),
    };

    let stem = FsPath::new(&retrieved.job.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcript")
        .replace('"', "");
    info!("Serving transcript for job {}", ulid);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.txt\"", stem),
            ),
            (HeaderName::from_static("x-job-ulid"), retrieved.job.ulid.clone()),
            (
                HeaderName::from_static("x-job-status"),
                retrieved.job.status.to_string(),
            ),
            (
                HeaderName::from_static("x-first-retrieval"),
                retrieved.first_retrieval.to_string(),
            ),
        ],
        retrieved.transcript,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct TranscriptStatus {
    has_transcript: bool,
}

async fn check_transcript_status(
    State(engine): State<Arc<JobEngine>>,
    Path(ulid): Path<String>,
) -> Response {
    match engine.has_transcript(&ulid).await {
        Ok(has_transcript) => Json(TranscriptStatus { has_transcript }).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_job(State(engine): State<Arc<JobEngine>>, Path(ulid): Path<String>) -> Response {
    match engine.job(&ulid).await {
        Ok(Some(job)) => Json(ApiResponse::success(job)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("Job not found".to_string())),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
