use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::schedule::error::Result;
use crate::schedule::types::{ClaimedJob, JobPriority, WorkerCapabilities};
use crate::storage::job::JobStorage;

pub const DEFAULT_CLAIM_ATTEMPTS: u32 = 5;

enum TierOutcome {
    Claimed(ClaimedJob),
    Empty,
    /// Candidates exist but every attempt lost the race for them.
    Contended,
}

/// Hands each claimable job to exactly one worker, high priority first and
/// oldest first within a priority.
pub struct Dispatcher {
    storage: Arc<dyn JobStorage>,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(storage: Arc<dyn JobStorage>) -> Self {
        Self {
            storage,
            max_attempts: DEFAULT_CLAIM_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn claim(&self, worker: &WorkerCapabilities) -> Result<Option<ClaimedJob>> {
        for priority in JobPriority::DISPATCH_ORDER {
            match self.claim_tier(priority, worker).await? {
                TierOutcome::Claimed(job) => {
                    info!("Worker {} claimed job {} ({})", worker.label(), job.ulid, priority);
                    return Ok(Some(job));
                }
                TierOutcome::Empty => continue,
                // lower tiers must not jump ahead of contended higher ones
                TierOutcome::Contended => {
                    warn!(
                        "Worker {} lost every claim attempt for {} priority jobs",
                        worker.label(),
                        priority
                    );
                    return Ok(None);
                }
            }
        }

        debug!("No claimable job for worker {}", worker.label());
        Ok(None)
    }

    async fn claim_tier(&self, priority: JobPriority, worker: &WorkerCapabilities) -> Result<TierOutcome> {
        for attempt in 1..=self.max_attempts {
            if let Some(job) = self
                .storage
                .claim_next(priority, &worker.models, Utc::now())
                .await?
            {
                return Ok(TierOutcome::Claimed(job.claimed()));
            }

            if !self.storage.has_claimable(priority, &worker.models).await? {
                return Ok(TierOutcome::Empty);
            }
            debug!(
                "Claim conflict for worker {} on {} priority (attempt {}/{})",
                worker.label(),
                priority,
                attempt,
                self.max_attempts
            );
        }

        Ok(TierOutcome::Contended)
    }
}
