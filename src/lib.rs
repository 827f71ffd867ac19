pub mod config;
pub mod schedule;
pub mod storage;
pub mod utils;
pub mod web;
pub mod worker;

use std::sync::Arc;

use schedule::JobEngine;

pub use config::{Config, WorkerConfig};

pub const VERSION: &str = env!("GIT_HASH");

pub struct AppContext {
    pub engine: Arc<JobEngine>,
}

impl AppContext {
    pub fn new(engine: Arc<JobEngine>) -> Self {
        Self { engine }
    }
}

pub fn init_env(config: &Config) {
    // make sure data directories exist
    let db_path = config
        .sqlite_path
        .strip_prefix("sqlite://")
        .or_else(|| config.sqlite_path.strip_prefix("sqlite:"));
    if let Some(db_path) = db_path {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
    std::fs::create_dir_all(&config.audio_path).unwrap_or_else(|e| {
        eprintln!("Failed to create audio directory: {}", e);
    });
}
