use anyhow::{Context, Result};
use reqwest::{multipart, StatusCode};

use crate::schedule::{ClaimedJob, JobPriority, PingOutcome, SubmittedJob, WorkerCapabilities};
use crate::web::handlers::worker::{ClaimResponse, HeartbeatResponse};

/// HTTP client for the job server, used by workers and by submitting clients.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    base_url: String,
    worker: WorkerCapabilities,
}

impl WorkerClient {
    pub fn new(base_url: impl Into<String>, worker: WorkerCapabilities) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn request_job(&self) -> Result<Option<ClaimedJob>> {
        let mut query = Vec::new();
        if let Some(worker_id) = &self.worker.worker_id {
            query.push(("worker_id", worker_id.clone()));
        }
        if !self.worker.models.is_empty() {
            query.push(("models", self.worker.models.join(",")));
        }

        let response: ClaimResponse = self
            .client
            .get(self.url("/request-new-job"))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.job.filter(|_| response.job_available))
    }

    pub async fn download_audio(&self, ulid: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(self.url(&format!("/request-audio/{}", ulid)))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to download audio for job {}", ulid))?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    pub async fn heartbeat(&self, ulid: &str) -> Result<PingOutcome> {
        let response = self
            .client
            .get(self.url(&format!("/heartbeat/{}", ulid)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(PingOutcome::Acknowledged),
            StatusCode::NOT_FOUND => Ok(PingOutcome::NotFound),
            StatusCode::CONFLICT => {
                let body: HeartbeatResponse = response.json().await?;
                let status = body
                    .status
                    .ok_or_else(|| anyhow::anyhow!("Heartbeat conflict without a status: {}", body.message))?;
                Ok(PingOutcome::NotTranscribing(status))
            }
            other => Err(anyhow::anyhow!("Heartbeat for job {} failed with status {}", ulid, other)),
        }
    }

    pub async fn return_job(&self, ulid: &str, transcript: &str) -> Result<()> {
        self.client
            .post(self.url("/return-job"))
            .form(&[("ulid", ulid), ("transcript", transcript)])
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Server rejected transcript for job {}", ulid))?;
        Ok(())
    }

    pub async fn report_failure(&self, ulid: &str) -> Result<()> {
        self.client
            .post(self.url(&format!("/report-failure/{}", ulid)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn submit(
        &self,
        file_name: &str,
        audio: Vec<u8>,
        priority: JobPriority,
        model: Option<&str>,
    ) -> Result<SubmittedJob> {
        let mut form = multipart::Form::new()
            .text("priority_level", priority.to_string())
            .part("file", multipart::Part::bytes(audio).file_name(file_name.to_string()));
        if let Some(model) = model {
            form = form.text("whisper_model", model.to_string());
        }

        let submitted = self
            .client
            .post(self.url("/new-job"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(submitted)
    }

    pub async fn fetch_transcript(&self, ulid: &str) -> Result<String> {
        let text = self
            .client
            .get(self.url(&format!("/transcript/{}", ulid)))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Transcript for job {} unavailable", ulid))?
            .text()
            .await?;
        Ok(text)
    }
}
