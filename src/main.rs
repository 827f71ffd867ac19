#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use whisperhub::{
    init_env,
    schedule::{EngineConfig, JobEngine, SweepScheduler},
    storage::{LocalBlobStore, SqliteJobStorage},
    utils::logger,
    AppContext, Config, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_env(&config);
    let _guard = logger::init(config.log_path.clone(), "whisperhub.log")?;

    info!("Starting whisperhub {}...", VERSION);

    info!("Initializing Storage...");
    let storage = SqliteJobStorage::new(&config.sqlite_path).await?;
    let blobs = LocalBlobStore::new(config.audio_path.clone());

    info!("Initializing Job Engine...");
    let engine = Arc::new(JobEngine::new(
        Arc::new(storage),
        Arc::new(blobs),
        EngineConfig {
            default_model: config.default_model.clone(),
            claim_attempts: config.claim_attempts,
        },
    ));

    SweepScheduler::new(engine.clone(), config.sweep_interval, config.heartbeat_timeout).spawn();

    let ctx = Arc::new(AppContext::new(engine));

    match whisperhub::web::start_server(ctx, config.bind_addr, config.max_upload_bytes).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    info!("Shutting down...");
    Ok(())
}
