use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::schedule::error::{JobError, Result};
use crate::schedule::types::{JobStatus, Retrieved};
use crate::storage::blob;
use crate::storage::job::JobStorage;

/// Serves finished transcripts. The first successful fetch flips the job to
/// retrieved and deletes the source audio; only the caller that wins that
/// flip deletes anything.
pub struct RetrievalGate {
    storage: Arc<dyn JobStorage>,
}

impl RetrievalGate {
    pub fn new(storage: Arc<dyn JobStorage>) -> Self {
        Self { storage }
    }

    pub async fn fetch(&self, ulid: &str) -> Result<Retrieved> {
        let job = self
            .storage
            .get(ulid)
            .await?
            .ok_or_else(|| JobError::NotFound(ulid.to_string()))?;

        if !job.status.has_transcript() {
            return Err(JobError::NotReady {
                ulid: ulid.to_string(),
                current: job.status,
            });
        }

        let stored = match job.transcript_path.as_deref() {
            Some(path) => blob::read(Path::new(path)).await?,
            None => None,
        };
        let Some(transcript) = stored else {
            let path = job.transcript_path.clone().unwrap_or_default();
            error!("Job {} is {} but transcript {:?} is missing", ulid, job.status, path);
            return Err(JobError::MissingArtifact {
                ulid: ulid.to_string(),
                status: job.status,
                path,
            });
        };

        let mut first_retrieval = false;
        if job.status == JobStatus::Completed {
            let release = Box::pin(blob::release_audio(PathBuf::from(&job.file_path)));
            first_retrieval = self.storage.mark_retrieved(ulid, Utc::now(), release).await?;
            if first_retrieval {
                info!("Job {} retrieved, source audio released", ulid);
            }
        }

        let current = match self.storage.get(ulid).await? {
            Some(current) => current,
            None => job,
        };

        Ok(Retrieved {
            transcript,
            job: current.view(),
            first_retrieval,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::schedule::testing::{submit, TestEngine};
    use crate::schedule::types::{JobPriority, WorkerCapabilities};

    async fn completed_job(t: &TestEngine, text: &str) -> (String, String) {
        let ulid = submit(&t.engine, JobPriority::Low, "clip.mp3").await;
        let claimed = t.engine.claim(&WorkerCapabilities::any("w")).await.unwrap().unwrap();
        t.engine.complete(&ulid, text).await.unwrap();
        (ulid, claimed.file_path)
    }

    #[tokio::test]
    async fn first_fetch_releases_audio_and_later_fetches_are_reads() {
        let t = TestEngine::new().await;
        let (ulid, audio) = completed_job(&t, "hello").await;
        assert!(Path::new(&audio).exists());

        let first = t.engine.fetch(&ulid).await.unwrap();
        assert_eq!(first.transcript, b"hello");
        assert!(first.first_retrieval);
        assert_eq!(first.job.status, JobStatus::Retrieved);
        assert!(!Path::new(&audio).exists());

        let second = t.engine.fetch(&ulid).await.unwrap();
        assert_eq!(second.transcript, b"hello");
        assert!(!second.first_retrieval);
        assert_eq!(second.job.status, JobStatus::Retrieved);
    }

    #[tokio::test]
    async fn concurrent_fetches_delete_audio_exactly_once() {
        let t = TestEngine::new().await;
        let (ulid, audio) = completed_job(&t, "both see this").await;

        let (a, b) = tokio::join!(t.engine.fetch(&ulid), t.engine.fetch(&ulid));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.transcript, b"both see this");
        assert_eq!(b.transcript, b"both see this");
        assert!(a.first_retrieval ^ b.first_retrieval);
        assert!(!Path::new(&audio).exists());
    }

    #[tokio::test]
    async fn fetch_before_completion_is_not_ready() {
        let t = TestEngine::new().await;
        let ulid = submit(&t.engine, JobPriority::Low, "clip.mp3").await;

        match t.engine.fetch(&ulid).await.unwrap_err() {
            JobError::NotReady { current, .. } => assert_eq!(current, JobStatus::Pending),
            other => panic!("unexpected error: {}", other),
        }
        let err = t.engine.fetch("ghost").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_transcript_is_a_consistency_violation() {
        let t = TestEngine::new().await;
        let (ulid, audio) = completed_job(&t, "soon gone").await;
        std::fs::remove_file(Path::new(&audio).with_file_name("clip.txt")).unwrap();

        let err = t.engine.fetch(&ulid).await.unwrap_err();
        assert!(matches!(err, JobError::MissingArtifact { status: JobStatus::Completed, .. }));
        assert!(err.is_internal());
        // nothing was released
        assert!(Path::new(&audio).exists());
        assert_eq!(t.engine.job(&ulid).await.unwrap().unwrap().status, JobStatus::Completed);
    }
}
