use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::WorkerClient;
use crate::schedule::PingOutcome;

/// Pings the server for one job until dropped, or until the server says the
/// job is no longer ours.
pub struct HeartbeatPinger {
    handle: JoinHandle<()>,
}

impl HeartbeatPinger {
    pub fn spawn(client: Arc<WorkerClient>, ulid: String, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match client.heartbeat(&ulid).await {
                    Ok(PingOutcome::Acknowledged) => debug!("Heartbeat acknowledged for {}", ulid),
                    Ok(outcome) => {
                        warn!("Stopping heartbeat for {}: {:?}", ulid, outcome);
                        break;
                    }
                    // transient, keep trying until the next tick
                    Err(e) => warn!("Heartbeat for {} failed: {}", ulid, e),
                }
            }
        });
        Self { handle }
    }
}

impl Drop for HeartbeatPinger {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
