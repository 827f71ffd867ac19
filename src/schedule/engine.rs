use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use crate::schedule::dispatcher::Dispatcher;
use crate::schedule::error::{JobError, Result};
use crate::schedule::heartbeat::HeartbeatMonitor;
use crate::schedule::ingester::ResultIngester;
use crate::schedule::retrieval::RetrievalGate;
use crate::schedule::submit::Submitter;
use crate::schedule::types::{
    ClaimedJob, CompletedJob, JobStats, JobView, PingOutcome, Retrieved, SubmitRequest,
    SubmittedJob, WorkerCapabilities,
};
use crate::storage::blob::{self, LocalBlobStore};
use crate::storage::job::JobStorage;
use crate::web::Pagination;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_model: String,
    pub claim_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "medium".to_string(),
            claim_attempts: crate::schedule::dispatcher::DEFAULT_CLAIM_ATTEMPTS,
        }
    }
}

/// Single entry point for the transport layer and the background sweep.
pub struct JobEngine {
    storage: Arc<dyn JobStorage>,
    submitter: Submitter,
    dispatcher: Dispatcher,
    monitor: HeartbeatMonitor,
    ingester: ResultIngester,
    gate: RetrievalGate,
}

impl JobEngine {
    pub fn new(storage: Arc<dyn JobStorage>, blobs: Arc<LocalBlobStore>, config: EngineConfig) -> Self {
        info!(
            "Job engine using audio root {:?}, default model {}",
            blobs.root(),
            config.default_model
        );
        Self {
            submitter: Submitter::new(storage.clone(), blobs, config.default_model),
            dispatcher: Dispatcher::new(storage.clone()).with_max_attempts(config.claim_attempts),
            monitor: HeartbeatMonitor::new(storage.clone()),
            ingester: ResultIngester::new(storage.clone()),
            gate: RetrievalGate::new(storage.clone()),
            storage,
        }
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmittedJob> {
        self.submitter.submit(req).await
    }

    pub async fn claim(&self, worker: &WorkerCapabilities) -> Result<Option<ClaimedJob>> {
        self.dispatcher.claim(worker).await
    }

    pub async fn ping(&self, ulid: &str) -> Result<PingOutcome> {
        self.monitor.ping(ulid).await
    }

    pub async fn sweep(&self, timeout: Duration) -> Result<Vec<String>> {
        self.monitor.sweep(timeout).await
    }

    pub async fn complete(&self, ulid: &str, transcript: &str) -> Result<CompletedJob> {
        self.ingester.complete(ulid, transcript).await
    }

    pub async fn report_failure(&self, ulid: &str) -> Result<()> {
        self.ingester.report_failure(ulid).await
    }

    pub async fn has_transcript(&self, ulid: &str) -> Result<bool> {
        self.ingester.has_transcript(ulid).await
    }

    pub async fn fetch(&self, ulid: &str) -> Result<Retrieved> {
        self.gate.fetch(ulid).await
    }

    pub async fn job(&self, ulid: &str) -> Result<Option<JobView>> {
        Ok(self.storage.get(ulid).await?.map(|job| job.view()))
    }

    pub async fn list(&self, pagination: &Pagination) -> Result<Vec<JobView>> {
        Ok(self
            .storage
            .list(pagination)
            .await?
            .iter()
            .map(|job| job.view())
            .collect())
    }

    /// Source audio for a worker to download, with its original file name.
    pub async fn audio(&self, ulid: &str) -> Result<(String, Vec<u8>)> {
        let job = self
            .storage
            .get(ulid)
            .await?
            .ok_or_else(|| JobError::NotFound(ulid.to_string()))?;

        match blob::read(Path::new(&job.file_path)).await? {
            Some(bytes) => Ok((job.file_name, bytes)),
            None => Err(JobError::NotFound(format!("audio for job {}", ulid))),
        }
    }

    pub async fn stats(&self) -> Result<JobStats> {
        Ok(JobStats::from_counts(self.storage.status_counts().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::testing::{submit, TestEngine};
    use crate::schedule::types::{JobPriority, JobStatus};

    #[tokio::test]
    async fn stats_total_matches_sum_over_statuses() {
        let t = TestEngine::new().await;
        let worker = WorkerCapabilities::any("w");
        for i in 0..5 {
            submit(&t.engine, JobPriority::Low, &format!("{}.mp3", i)).await;
        }
        let first = t.engine.claim(&worker).await.unwrap().unwrap();
        let second = t.engine.claim(&worker).await.unwrap().unwrap();
        let third = t.engine.claim(&worker).await.unwrap().unwrap();
        t.engine.report_failure(&first.ulid).await.unwrap();
        t.engine.complete(&second.ulid, "done").await.unwrap();
        t.engine.complete(&third.ulid, "done too").await.unwrap();
        t.engine.fetch(&third.ulid).await.unwrap();

        let stats = t.engine.stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.by_status.values().sum::<u64>(), stats.total);
        assert_eq!(stats.count(JobStatus::Pending), 2);
        assert_eq!(stats.count(JobStatus::Failed), 1);
        assert_eq!(stats.count(JobStatus::Completed), 1);
        assert_eq!(stats.count(JobStatus::Retrieved), 1);
        assert_eq!(stats.count(JobStatus::Transcribing), 0);
    }

    #[tokio::test]
    async fn listing_far_past_the_end_is_empty() {
        let t = TestEngine::new().await;
        submit(&t.engine, JobPriority::Low, "a.mp3").await;
        let page = Pagination { index: u64::MAX / 2, size: 200 };
        assert!(t.engine.list(&page).await.unwrap().is_empty());
        assert_eq!(t.engine.list(&Pagination::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_store_reports_zero_total() {
        let t = TestEngine::new().await;
        let stats = t.engine.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.by_status.is_empty());
    }

    #[tokio::test]
    async fn submission_starts_pending_without_transcript() {
        let t = TestEngine::new().await;
        let submitted = t
            .engine
            .submit(SubmitRequest {
                priority: JobPriority::High,
                model_selector: None,
                ulid: None,
                file_name: "../escape/voice.ogg".to_string(),
                audio: b"OggS".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(submitted.status, JobStatus::Pending);

        let job = t.engine.job(&submitted.job_ulid).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.file_name, "voice.ogg");
        assert_eq!(job.model_selector, "medium");
        assert!(!job.has_transcript);

        let (name, bytes) = t.engine.audio(&submitted.job_ulid).await.unwrap();
        assert_eq!(name, "voice.ogg");
        assert_eq!(bytes, b"OggS");
    }

    #[tokio::test]
    async fn caller_supplied_ulid_is_kept_and_must_be_unique() {
        let t = TestEngine::new().await;
        let request = SubmitRequest {
            priority: JobPriority::Low,
            model_selector: Some("large-v3".to_string()),
            ulid: Some("01HZXC3V9QKJ8M5T2R7W4Y6N0P".to_string()),
            file_name: "a.wav".to_string(),
            audio: vec![1, 2, 3],
        };
        let submitted = t.engine.submit(request.clone()).await.unwrap();
        assert_eq!(submitted.job_ulid, "01HZXC3V9QKJ8M5T2R7W4Y6N0P");
        assert_eq!(
            t.engine.job(&submitted.job_ulid).await.unwrap().unwrap().model_selector,
            "large-v3"
        );

        let err = t.engine.submit(request).await.unwrap_err();
        assert!(matches!(err, JobError::DuplicateUlid(_)));
        assert_eq!(t.engine.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn submission_rejects_bad_input() {
        let t = TestEngine::new().await;
        let base = SubmitRequest {
            priority: JobPriority::Low,
            model_selector: None,
            ulid: None,
            file_name: "a.wav".to_string(),
            audio: vec![1],
        };

        let empty_audio = SubmitRequest { audio: Vec::new(), ..base.clone() };
        let no_name = SubmitRequest { file_name: "dir/".to_string(), ..base.clone() };
        let path_ulid = SubmitRequest { ulid: Some("../x".to_string()), ..base };
        for req in [empty_audio, no_name, path_ulid] {
            let err = t.engine.submit(req).await.unwrap_err();
            assert!(matches!(err, JobError::InvalidRequest(_)));
        }
        assert_eq!(t.engine.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn complete_then_fetch_twice_scenario() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "a.mp3").await;
        t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();
        t.engine.complete(&ulid, "hello").await.unwrap();

        let first = t.engine.fetch(&ulid).await.unwrap();
        assert_eq!(first.transcript, b"hello");
        assert_eq!(t.engine.job(&ulid).await.unwrap().unwrap().status, JobStatus::Retrieved);
        assert!(t.engine.audio(&ulid).await.is_err());

        let again = t.engine.fetch(&ulid).await.unwrap();
        assert_eq!(again.transcript, b"hello");
        assert!(!again.first_retrieval);
    }
}
