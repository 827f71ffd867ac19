use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info};

pub mod client;
pub mod command;
pub mod heartbeat;

pub use client::WorkerClient;
pub use command::CommandTranscriber;
pub use heartbeat::HeartbeatPinger;

use crate::schedule::ClaimedJob;

/// The opaque transcription capability a worker brings.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, job: &ClaimedJob, audio: Vec<u8>) -> Result<String>;
}

/// Pull loop: claim, download, transcribe under heartbeat, report back.
pub struct WorkerLoop<T: Transcriber> {
    client: Arc<WorkerClient>,
    transcriber: T,
    // wait between polls when the queue is empty
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl<T: Transcriber> WorkerLoop<T> {
    pub fn new(client: WorkerClient, transcriber: T) -> Self {
        Self {
            client: Arc::new(client),
            transcriber,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub async fn run(&self) {
        loop {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => sleep(self.poll_interval).await,
                Err(e) => {
                    error!("Error processing job: {}", e);
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Processes at most one job. `Ok(false)` means nothing was available.
    pub async fn run_once(&self) -> Result<bool> {
        let job = match self.client.request_job().await? {
            Some(job) => job,
            None => return Ok(false),
        };
        info!("Claimed job {} ({})", job.ulid, job.model_selector);

        let audio = match self.client.download_audio(&job.ulid).await {
            Ok(audio) => audio,
            Err(e) => {
                self.give_up(&job).await;
                return Err(e);
            }
        };

        let pinger = HeartbeatPinger::spawn(
            self.client.clone(),
            job.ulid.clone(),
            self.heartbeat_interval,
        );
        let result = self.transcriber.transcribe(&job, audio).await;
        drop(pinger);

        match result {
            Ok(transcript) => {
                self.client.return_job(&job.ulid, &transcript).await?;
                info!("Returned transcript for job {}", job.ulid);
            }
            Err(e) => {
                error!("Transcription of job {} failed: {}", job.ulid, e);
                self.give_up(&job).await;
            }
        }
        Ok(true)
    }

    async fn give_up(&self, job: &ClaimedJob) {
        if let Err(e) = self.client.report_failure(&job.ulid).await {
            error!("Failed to report failure for job {}: {}", job.ulid, e);
        }
    }
}
