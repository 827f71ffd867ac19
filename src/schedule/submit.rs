use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use ulid::Ulid;

use crate::schedule::error::{JobError, Result};
use crate::schedule::types::{NewJob, SubmitRequest, SubmittedJob};
use crate::storage::blob::{self, LocalBlobStore};
use crate::storage::job::JobStorage;

/// Accepts new work: stores the audio, then records a pending job.
pub struct Submitter {
    storage: Arc<dyn JobStorage>,
    blobs: Arc<LocalBlobStore>,
    default_model: String,
}

impl Submitter {
    pub fn new(
        storage: Arc<dyn JobStorage>,
        blobs: Arc<LocalBlobStore>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            blobs,
            default_model: default_model.into(),
        }
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmittedJob> {
        let file_name = blob::sanitize_file_name(&req.file_name)
            .ok_or_else(|| JobError::InvalidRequest(format!("invalid file name: {:?}", req.file_name)))?;
        if req.audio.is_empty() {
            return Err(JobError::InvalidRequest("audio payload is empty".to_string()));
        }

        let ulid = match req.ulid.map(|u| u.trim().to_string()) {
            Some(u) if u.is_empty() => {
                return Err(JobError::InvalidRequest("ulid must not be blank".to_string()))
            }
            // names a directory and is echoed in response headers
            Some(u) if Ulid::from_string(&u).is_err() => {
                return Err(JobError::InvalidRequest(format!("invalid ulid: {:?}", u)))
            }
            Some(u) => u,
            None => Ulid::new().to_string(),
        };

        if self.storage.get(&ulid).await?.is_some() {
            return Err(JobError::DuplicateUlid(ulid));
        }

        let model_selector = req
            .model_selector
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        // concurrent submissions of one ulid each stage their own file; only
        // the one whose row commits moves it into place
        let (staged, target) = self.blobs.stage_audio(&ulid, &file_name, &req.audio).await?;

        let new_job = NewJob {
            ulid: ulid.clone(),
            priority: req.priority,
            model_selector,
            file_name,
            file_path: target.to_string_lossy().into_owned(),
            created_at: Utc::now(),
        };

        let finalize = Box::pin(blob::promote(staged.clone(), target.clone()));
        match self.storage.create(&new_job, finalize).await {
            Ok(job) => {
                info!("Created job {} (priority {}, model {})", job.ulid, job.priority, job.model_selector);
                Ok(SubmittedJob {
                    job_ulid: job.ulid,
                    status: job.status,
                })
            }
            Err(e) => {
                error!("Failed to record job {}: {}", ulid, e);
                self.blobs.discard_audio(&staged, &target).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::testing::TestEngine;
    use crate::schedule::types::JobPriority;

    fn request(ulid: &str, file_name: &str, audio: Vec<u8>) -> SubmitRequest {
        SubmitRequest {
            priority: JobPriority::Low,
            model_selector: None,
            ulid: Some(ulid.to_string()),
            file_name: file_name.to_string(),
            audio,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_submissions_keep_only_the_winners_audio() {
        let t = TestEngine::new().await;

        for round in 0..30u8 {
            let ulid = Ulid::new().to_string();
            let (first_name, second_name) = if round % 2 == 0 {
                ("same.wav", "same.wav")
            } else {
                ("a.wav", "b.wav")
            };

            let first = {
                let engine = t.engine.clone();
                let req = request(&ulid, first_name, vec![1; 64]);
                tokio::spawn(async move { engine.submit(req).await })
            };
            let second = {
                let engine = t.engine.clone();
                let req = request(&ulid, second_name, vec![2; 64]);
                tokio::spawn(async move { engine.submit(req).await })
            };
            let results = [first.await.unwrap(), second.await.unwrap()];

            let winners: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, r)| r.is_ok())
                .map(|(i, _)| i)
                .collect();
            assert_eq!(winners.len(), 1, "round {}", round);
            let loser = &results[1 - winners[0]];
            assert!(matches!(loser, Err(JobError::DuplicateUlid(_))));

            let (name, bytes) = t.engine.audio(&ulid).await.unwrap();
            let expected = if winners[0] == 0 { 1 } else { 2 };
            assert_eq!(bytes, vec![expected; 64], "round {}", round);
            assert_eq!(name, if winners[0] == 0 { first_name } else { second_name });

            let files = std::fs::read_dir(t.dir.path().join("audio").join(&ulid))
                .unwrap()
                .count();
            assert_eq!(files, 1, "round {}", round);
        }
    }

    #[tokio::test]
    async fn caller_ulid_must_be_a_ulid() {
        let t = TestEngine::new().await;
        for bad in ["01HZX\u{7}BELL", "job-1", "../x", "01HZXCUSTOMULID0000000000"] {
            let err = t.engine.submit(request(bad, "a.wav", vec![1])).await.unwrap_err();
            assert!(matches!(err, JobError::InvalidRequest(_)), "{:?}", bad);
        }
        assert_eq!(t.engine.stats().await.unwrap().total, 0);
        assert!(!t.dir.path().join("audio").exists());
    }
}
