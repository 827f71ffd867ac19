use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::schedule::error::{JobError, Result};
use crate::schedule::types::{CompletedJob, JobStatus};
use crate::storage::blob;
use crate::storage::job::JobStorage;

/// Accepts worker results and failure reports.
///
/// A result is accepted while the job is transcribing, and also when the
/// sweep already failed it: a slow worker that still finishes saves a
/// re-transcription.
pub struct ResultIngester {
    storage: Arc<dyn JobStorage>,
}

impl ResultIngester {
    pub fn new(storage: Arc<dyn JobStorage>) -> Self {
        Self { storage }
    }

    pub async fn complete(&self, ulid: &str, transcript: &str) -> Result<CompletedJob> {
        let job = self
            .storage
            .get(ulid)
            .await?
            .ok_or_else(|| JobError::NotFound(ulid.to_string()))?;

        if !matches!(job.status, JobStatus::Transcribing | JobStatus::Failed) {
            return Err(JobError::InvalidTransition {
                ulid: ulid.to_string(),
                action: "accept a transcript",
                current: job.status,
            });
        }

        let target = blob::transcript_path_for(&job.file_path, &job.file_name);
        let transcript_path = target.to_string_lossy().into_owned();
        let staged = blob::stage_transcript(&target, transcript).await?;

        let finalize = Box::pin(blob::promote(staged.clone(), target));
        let committed = match self
            .storage
            .mark_completed(ulid, &transcript_path, Utc::now(), finalize)
            .await
        {
            Ok(committed) => committed,
            Err(e) => {
                blob::discard_staged(&staged).await;
                return Err(e);
            }
        };

        if !committed {
            blob::discard_staged(&staged).await;
            // lost to a concurrent transition; report what won
            return match self.storage.get(ulid).await? {
                None => Err(JobError::NotFound(ulid.to_string())),
                Some(current) => Err(JobError::InvalidTransition {
                    ulid: ulid.to_string(),
                    action: "accept a transcript",
                    current: current.status,
                }),
            };
        }

        let salvaged = job.status == JobStatus::Failed;
        if salvaged {
            warn!("Accepted late transcript for job {} after it was failed", ulid);
        }
        info!("Job {} completed, transcript at {}", ulid, transcript_path);

        Ok(CompletedJob {
            ulid: ulid.to_string(),
            transcript_path,
            salvaged,
        })
    }

    /// Force-fails a transcribing job so it becomes claimable again.
    pub async fn report_failure(&self, ulid: &str) -> Result<()> {
        if self.storage.mark_failed(ulid, Utc::now()).await? {
            warn!("Job {} reported as failed", ulid);
            return Ok(());
        }

        match self.storage.get(ulid).await? {
            None => Err(JobError::NotFound(ulid.to_string())),
            Some(job) => Err(JobError::InvalidTransition {
                ulid: ulid.to_string(),
                action: "be marked failed",
                current: job.status,
            }),
        }
    }

    pub async fn has_transcript(&self, ulid: &str) -> Result<bool> {
        Ok(self
            .storage
            .get(ulid)
            .await?
            .map(|job| job.transcript_path.is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::schedule::testing::{submit, TestEngine};
    use crate::schedule::types::{JobPriority, PingOutcome, WorkerCapabilities};

    #[tokio::test]
    async fn complete_writes_transcript_next_to_audio() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "meeting.mp3").await;
        let claimed = t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();

        let done = t.engine.complete(&ulid, "hello").await.unwrap();
        assert!(!done.salvaged);
        let expected = Path::new(&claimed.file_path).with_file_name("meeting.txt");
        assert_eq!(Path::new(&done.transcript_path), expected);
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "hello");

        let job = t.engine.job(&ulid).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.has_transcript);
        assert!(t.engine.has_transcript(&ulid).await.unwrap());
    }

    #[tokio::test]
    async fn complete_rejects_jobs_that_were_never_claimed() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "a.mp3").await;

        let err = t.engine.complete(&ulid, "early").await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition { current: JobStatus::Pending, .. }
        ));
        let job = t.engine.job(&ulid).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.has_transcript);
        assert!(!t.engine.has_transcript(&ulid).await.unwrap());
    }

    #[tokio::test]
    async fn complete_rejects_already_completed_job() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "a.mp3").await;
        t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();
        let first = t.engine.complete(&ulid, "first").await.unwrap();

        let err = t.engine.complete(&ulid, "second").await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition { current: JobStatus::Completed, .. }
        ));
        assert_eq!(std::fs::read_to_string(&first.transcript_path).unwrap(), "first");
    }

    #[tokio::test]
    async fn complete_unknown_job_is_not_found() {
        let t = TestEngine::new().await;
        let err = t.engine.complete("ghost", "text").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test]
    async fn late_result_after_sweep_is_salvaged() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "slow.mp3").await;
        t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        t.engine.sweep(chrono::Duration::milliseconds(5)).await.unwrap();

        let done = t.engine.complete(&ulid, "finally").await.unwrap();
        assert!(done.salvaged);
        assert_eq!(t.engine.job(&ulid).await.unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn stale_worker_result_wins_over_reclaiming_worker() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "slow.mp3").await;
        t.engine.claim(&WorkerCapabilities::any("stale")).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(t.engine.sweep(chrono::Duration::milliseconds(5)).await.unwrap(), vec![ulid.clone()]);

        let again = t.engine.claim(&WorkerCapabilities::any("fresh")).await.unwrap().unwrap();
        assert_eq!(again.ulid, ulid);

        // jobs carry no owner: whichever worker returns first completes it
        let done = t.engine.complete(&ulid, "from the stale worker").await.unwrap();
        assert!(!done.salvaged);

        assert_eq!(
            t.engine.ping(&ulid).await.unwrap(),
            PingOutcome::NotTranscribing(JobStatus::Completed)
        );
        let err = t.engine.complete(&ulid, "from the fresh worker").await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition { current: JobStatus::Completed, .. }
        ));
        assert_eq!(
            std::fs::read_to_string(&done.transcript_path).unwrap(),
            "from the stale worker"
        );
    }

    #[tokio::test]
    async fn storage_failure_leaves_job_reclaimable() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "a.mp3").await;
        let claimed = t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();

        // a directory in the transcript's place makes the final rename fail
        let target = Path::new(&claimed.file_path).with_file_name("a.txt");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("blocker"), b"x").unwrap();

        let err = t.engine.complete(&ulid, "text").await.unwrap_err();
        assert!(matches!(err, JobError::Storage { .. }));
        let job = t.engine.job(&ulid).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Transcribing);
        assert!(!job.has_transcript);

        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn report_failure_only_applies_to_transcribing_jobs() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "a.mp3").await;

        let err = t.engine.report_failure(&ulid).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { current: JobStatus::Pending, .. }));
        assert!(matches!(
            t.engine.report_failure("ghost").await.unwrap_err(),
            JobError::NotFound(_)
        ));

        t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();
        t.engine.report_failure(&ulid).await.unwrap();
        assert_eq!(t.engine.job(&ulid).await.unwrap().unwrap().status, JobStatus::Failed);
    }
}
