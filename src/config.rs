use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

const WHISPERHUB_SQLITE_PATH: &str = "sqlite://./whisperhub_data/database/whisperhub.db?mode=rwc";
const WHISPERHUB_AUDIO_PATH: &str = "./whisperhub_data/audio/";
const WHISPERHUB_LOG_PATH: &str = "./logs";
const WHISPERHUB_BIND_ADDR: &str = "0.0.0.0:5000";
const WHISPERHUB_SERVER_URL: &str = "http://127.0.0.1:5000";
const WHISPERHUB_SCRATCH_PATH: &str = "./whisperhub_data/scratch/";

/// Process environment first, then `.env`, then the built-in default.
fn read_var(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) => value,
        Err(_) => dotenv::var(key).unwrap_or_else(|_| default.to_string()),
    }
}

fn read_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key).or_else(|_| dotenv::var(key)) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sqlite_path: String,
    pub audio_path: String,
    pub log_path: String,
    pub bind_addr: SocketAddr,
    pub default_model: String,
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    pub claim_attempts: u32,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = read_var("WHISPERHUB_BIND_ADDR", WHISPERHUB_BIND_ADDR);
        Ok(Self {
            sqlite_path: read_var("WHISPERHUB_SQLITE_PATH", WHISPERHUB_SQLITE_PATH),
            audio_path: read_var("WHISPERHUB_AUDIO_PATH", WHISPERHUB_AUDIO_PATH),
            log_path: read_var("WHISPERHUB_LOG_PATH", WHISPERHUB_LOG_PATH),
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("Invalid WHISPERHUB_BIND_ADDR: {}", bind_addr))?,
            default_model: read_var("WHISPERHUB_DEFAULT_MODEL", "medium"),
            heartbeat_timeout: Duration::from_secs(read_parsed("WHISPERHUB_HEARTBEAT_TIMEOUT_SECS", 300)?),
            sweep_interval: Duration::from_secs(read_parsed("WHISPERHUB_SWEEP_INTERVAL_SECS", 60)?),
            claim_attempts: read_parsed("WHISPERHUB_CLAIM_RETRIES", 5)?,
            max_upload_bytes: read_parsed::<usize>("WHISPERHUB_MAX_UPLOAD_MB", 512)? * 1024 * 1024,
        })
    }
}

/// Settings for the `whisperhub-worker` binary.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_url: String,
    pub worker_id: String,
    pub models: Vec<String>,
    pub transcribe_command: String,
    pub scratch_path: String,
    pub log_path: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let transcribe_command = read_var("WHISPERHUB_TRANSCRIBE_CMD", "");
        if transcribe_command.trim().is_empty() {
            anyhow::bail!("WHISPERHUB_TRANSCRIBE_CMD must name the transcription command");
        }
        Ok(Self {
            server_url: read_var("WHISPERHUB_SERVER_URL", WHISPERHUB_SERVER_URL),
            worker_id: read_var("WHISPERHUB_WORKER_ID", &format!("worker-{}", std::process::id())),
            models: read_var("WHISPERHUB_WORKER_MODELS", "")
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            transcribe_command,
            scratch_path: read_var("WHISPERHUB_SCRATCH_PATH", WHISPERHUB_SCRATCH_PATH),
            log_path: read_var("WHISPERHUB_LOG_PATH", WHISPERHUB_LOG_PATH),
            poll_interval: Duration::from_secs(read_parsed("WHISPERHUB_POLL_INTERVAL_SECS", 5)?),
            heartbeat_interval: Duration::from_secs(read_parsed("WHISPERHUB_HEARTBEAT_INTERVAL_SECS", 30)?),
        })
    }
}
