use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::schedule::engine::JobEngine;

/// Runs the heartbeat sweep on a fixed interval, independent of requests.
pub struct SweepScheduler {
    engine: Arc<JobEngine>,
    interval: Duration,
    timeout: Duration,
}

impl SweepScheduler {
    pub fn new(engine: Arc<JobEngine>, interval: Duration, timeout: Duration) -> Self {
        Self {
            engine,
            interval,
            timeout,
        }
    }

    /// One sweep pass. Returns the number of requeued jobs.
    pub async fn tick(&self) -> Result<usize> {
        let timeout = chrono::Duration::from_std(self.timeout)?;
        Ok(self.engine.sweep(timeout).await?.len())
    }

    pub async fn run(self) {
        info!(
            "Heartbeat sweep every {:?}, stale after {:?}",
            self.interval, self.timeout
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("Error sweeping stalled jobs: {}", e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
