use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::Transcriber;
use crate::schedule::ClaimedJob;
use crate::storage::blob::sanitize_file_name;

/// Runs an external program per job. The audio is written to a scratch file
/// whose path is appended as the last argument; stdout is the transcript.
/// The job's model selector is exported as `WHISPERHUB_MODEL`.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandTranscriber {
    /// `command_line` is split on whitespace, e.g. `whisper-cli -m model.bin -f`.
    pub fn new(command_line: &str, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().context("Transcribe command is empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
            scratch_dir: scratch_dir.into(),
        })
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, job: &ClaimedJob, audio: Vec<u8>) -> Result<String> {
        let file_name = sanitize_file_name(&job.file_name).unwrap_or_else(|| "audio".to_string());
        let input = self.scratch_dir.join(format!("{}-{}", job.ulid, file_name));
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        tokio::fs::write(&input, &audio)
            .await
            .with_context(|| format!("Failed to write scratch audio {:?}", input))?;

        debug!("Running {} for job {}", self.program, job.ulid);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .env("WHISPERHUB_MODEL", &job.model_selector)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&input).await;

        let output = output.with_context(|| format!("Failed to spawn {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
