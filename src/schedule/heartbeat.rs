use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::schedule::error::Result;
use crate::schedule::types::PingOutcome;
use crate::storage::job::JobStorage;

/// Tracks worker liveness for in-flight jobs and requeues the ones whose
/// worker went quiet.
pub struct HeartbeatMonitor {
    storage: Arc<dyn JobStorage>,
}

impl HeartbeatMonitor {
    pub fn new(storage: Arc<dyn JobStorage>) -> Self {
        Self { storage }
    }

    /// Records a sign of life. Never changes the job's status.
    pub async fn ping(&self, ulid: &str) -> Result<PingOutcome> {
        if self.storage.touch_heartbeat(ulid, Utc::now()).await? == 1 {
            debug!("Heartbeat for job {}", ulid);
            return Ok(PingOutcome::Acknowledged);
        }

        match self.storage.get(ulid).await? {
            None => Ok(PingOutcome::NotFound),
            Some(job) => {
                warn!("Heartbeat for job {} rejected, job is {}", ulid, job.status);
                Ok(PingOutcome::NotTranscribing(job.status))
            }
        }
    }

    /// Moves every transcribing job silent for longer than `timeout` to
    /// failed, making it claimable again. Returns the requeued ulids.
    pub async fn sweep(&self, timeout: Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now() - timeout;
        let candidates = self.storage.list_stale(cutoff).await?;

        let mut requeued = Vec::new();
        for job in candidates {
            // re-checked in the update: a heartbeat may land in between
            if self.storage.fail_if_stale(&job.ulid, cutoff, Utc::now()).await? {
                let last_seen = job.last_heartbeat_at.unwrap_or(job.updated_at);
                warn!("Job {} stalled since {}, requeued as failed", job.ulid, last_seen);
                requeued.push(job.ulid);
            }
        }

        if !requeued.is_empty() {
            info!("Sweep requeued {} stalled job(s)", requeued.len());
        }
        Ok(requeued)
    }
}
