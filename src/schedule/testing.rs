use std::sync::Arc;

use tempfile::TempDir;

use crate::schedule::engine::{EngineConfig, JobEngine};
use crate::schedule::types::{JobPriority, SubmitRequest};
use crate::storage::blob::LocalBlobStore;
use crate::storage::job::SqliteJobStorage;

/// Engine over a throwaway database and audio root.
pub struct TestEngine {
    pub engine: Arc<JobEngine>,
    pub dir: TempDir,
}

impl TestEngine {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let storage = SqliteJobStorage::new(&url).await.unwrap();
        let blobs = LocalBlobStore::new(dir.path().join("audio"));
        let engine = JobEngine::new(Arc::new(storage), Arc::new(blobs), EngineConfig::default());
        Self {
            engine: Arc::new(engine),
            dir,
        }
    }
}

pub async fn submit(engine: &JobEngine, priority: JobPriority, file_name: &str) -> String {
    engine
        .submit(SubmitRequest {
            priority,
            model_selector: None,
            ulid: None,
            file_name: file_name.to_string(),
            audio: b"fake audio".to_vec(),
        })
        .await
        .unwrap()
        .job_ulid
}
