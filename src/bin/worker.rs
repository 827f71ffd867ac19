#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use tracing::info;
use whisperhub::{
    schedule::WorkerCapabilities,
    utils::logger,
    worker::{CommandTranscriber, WorkerClient, WorkerLoop},
    WorkerConfig, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WorkerConfig::from_env()?;
    let _guard = logger::init(config.log_path.clone(), "whisperhub-worker.log")?;

    info!(
        "Starting whisperhub worker {} ({}) against {}",
        config.worker_id, VERSION, config.server_url
    );

    let transcriber = CommandTranscriber::new(&config.transcribe_command, config.scratch_path.clone())?;
    let client = WorkerClient::new(
        config.server_url.clone(),
        WorkerCapabilities {
            worker_id: Some(config.worker_id.clone()),
            models: config.models.clone(),
        },
    );

    WorkerLoop::new(client, transcriber)
        .with_poll_interval(config.poll_interval)
        .with_heartbeat_interval(config.heartbeat_interval)
        .run()
        .await;

    Ok(())
}
